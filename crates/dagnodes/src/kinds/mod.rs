//! Executor kinds: strategies that build an executor from a plugin record

mod bundled;
mod mock;
mod remote;
mod script;

pub use bundled::BundledKind;
pub use mock::MockChainKind;
pub use remote::HttpKind;
pub use script::ScriptKind;

use dagcore::{ExecutionContext, ValueMap};
use serde_json::{json, Map};

/// Serialize a value map as a JSON object
pub(crate) fn map_to_json(map: &ValueMap) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<Map<_, _>>(),
    )
}

/// View of the execution context handed to out-of-process and scripted executors.
/// Secrets are never included.
pub(crate) async fn context_json(ctx: &ExecutionContext) -> serde_json::Value {
    let variables = ctx.variables_snapshot().await;
    json!({
        "executionId": ctx.execution_id.to_string(),
        "workflowId": ctx.workflow_id,
        "environment": ctx.environment,
        "userId": ctx.user_id,
        "variables": map_to_json(&variables),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcore::Value;

    #[test]
    fn request_bodies_keep_integers() {
        let mut inputs = ValueMap::new();
        inputs.insert("chainId".into(), Value::from(43114i64));
        inputs.insert("amount".into(), Value::from(9_007_199_254_740_993i64));
        inputs.insert("slippage".into(), Value::from(0.5));

        let body = map_to_json(&inputs);
        assert_eq!(body["chainId"].to_string(), "43114");
        assert_eq!(body["amount"].to_string(), "9007199254740993");
        assert_eq!(body, json!({"chainId": 43114, "amount": 9007199254740993u64, "slippage": 0.5}));
    }
}
