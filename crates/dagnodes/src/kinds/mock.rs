use async_trait::async_trait;
use dagcore::{ExecutionContext, Executor, NodeError, NodeExecutionResult, Value, ValueMap};
use dagruntime::{ExecutorKind, PluginDefinition};
use std::sync::Arc;
use std::time::Duration;

/// Placeholder for on-chain calls. Answers with fixed outputs and gas figures
/// taken from the record config:
/// - `outputs`: object merged over the step inputs
/// - `gas_used`: reported by both `estimate_gas` and `execute`
/// - `delay_ms`: artificial latency
/// - `fail`: when set, the call reports this failure message
pub struct MockChainKind;

impl ExecutorKind for MockChainKind {
    fn kind(&self) -> &str {
        "mock"
    }

    fn build(&self, plugin: &PluginDefinition) -> Result<Arc<dyn Executor>, NodeError> {
        let outputs = match plugin.config.get("outputs") {
            None | Some(Value::Null) => ValueMap::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(NodeError::InvalidInputType {
                    field: "outputs".to_string(),
                    expected: "object".to_string(),
                    actual: other.to_json().to_string(),
                })
            }
        };

        Ok(Arc::new(MockChainExecutor {
            name: format!("{} (mock)", plugin.node_type),
            outputs,
            gas_used: plugin.config.get("gas_used").and_then(Value::as_u64),
            delay: plugin
                .config
                .get("delay_ms")
                .and_then(Value::as_u64)
                .map(Duration::from_millis),
            failure: plugin
                .config
                .get("fail")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }
}

pub struct MockChainExecutor {
    name: String,
    outputs: ValueMap,
    gas_used: Option<u64>,
    delay: Option<Duration>,
    failure: Option<String>,
}

#[async_trait]
impl Executor for MockChainExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            tracing::debug!("{} simulating failure in {}", self.name, ctx.execution_id);
            return Ok(NodeExecutionResult::failure(message.clone()));
        }

        let mut outputs = inputs.clone();
        outputs.extend(self.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut result = NodeExecutionResult::success(outputs)
            .with_log(format!("{} simulated on {}", self.name, ctx.environment));
        if let Some(gas) = self.gas_used {
            result = result.with_gas_used(gas);
        }
        Ok(result)
    }

    async fn estimate_gas(
        &self,
        _inputs: &ValueMap,
        _ctx: &ExecutionContext,
    ) -> Result<Option<u64>, NodeError> {
        Ok(self.gas_used)
    }
}
