use async_trait::async_trait;
use dagcore::{ExecutionContext, Executor, ExecutorMetadata, NodeError, NodeExecutionResult, ValueMap};

/// Returns its merged inputs as outputs
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        _ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        Ok(NodeExecutionResult::success(inputs.clone()))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Pass inputs through unchanged".to_string(),
            category: "general".to_string(),
        }
    }
}
