use async_trait::async_trait;
use dagcore::{ExecutionContext, Executor, ExecutorMetadata, NodeError, NodeExecutionResult, ValueMap};

/// Simple debug node that logs its inputs
pub struct DebugExecutor;

#[async_trait]
impl Executor for DebugExecutor {
    fn name(&self) -> &str {
        "debug.log"
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let message = inputs
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();

        tracing::info!("DEBUG [{}]: {}", ctx.execution_id, message);
        let mut result = NodeExecutionResult::success(inputs.clone())
            .with_log(format!("DEBUG: {}", message));

        // Also log all inputs for visibility
        let mut keys: Vec<&String> = inputs.keys().collect();
        keys.sort();
        for key in keys {
            tracing::debug!("  {}: {:?}", key, inputs[key]);
            result = result.with_log(format!("  {}: {}", key, inputs[key].to_json()));
        }

        Ok(result.with_output("message", message))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
