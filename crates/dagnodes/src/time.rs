use async_trait::async_trait;
use dagcore::{ExecutionContext, Executor, ExecutorMetadata, NodeError, NodeExecutionResult, ValueMap};
use tokio::time::{sleep, Duration};

/// Delay execution for `delay_ms` milliseconds, then pass inputs through
pub struct DelayExecutor;

const DEFAULT_DELAY_MS: u64 = 1000;

#[async_trait]
impl Executor for DelayExecutor {
    fn name(&self) -> &str {
        "time.delay"
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        _ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let delay_ms = match inputs.get("delay_ms") {
            None => DEFAULT_DELAY_MS,
            Some(v) => v.as_u64().ok_or_else(|| NodeError::InvalidInputType {
                field: "delay_ms".to_string(),
                expected: "non-negative integer".to_string(),
                actual: v.to_json().to_string(),
            })?,
        };

        tracing::debug!("Delaying for {}ms", delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;

        Ok(NodeExecutionResult::success(inputs.clone()))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
