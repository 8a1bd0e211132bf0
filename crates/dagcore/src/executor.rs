use crate::{ExecutionContext, NodeError, ValueMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability that knows how to validate and run one node type
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable name (e.g., "HTTP request", "Rhai script")
    fn name(&self) -> &str;

    /// Check merged inputs before execution
    async fn validate(&self, _inputs: &ValueMap) -> ValidationResult {
        ValidationResult::ok()
    }

    /// Run the node. An `Err` is treated as an exception thrown by the executor;
    /// business failures are reported through `NodeExecutionResult::success`.
    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError>;

    /// Optional: estimate gas for a run with the given inputs
    async fn estimate_gas(
        &self,
        _inputs: &ValueMap,
        _ctx: &ExecutionContext,
    ) -> Result<Option<u64>, NodeError> {
        Ok(None)
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata::default()
    }
}

/// Descriptive metadata shown by tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ExecutorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Outcome of `Executor::validate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    /// Fold another result in; the combined result is valid only if both are
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self
    }
}

/// Deprecated boolean shape: `false` means invalid without details
impl From<bool> for ValidationResult {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            errors: Vec::new(),
        }
    }
}

/// Validation answer as received over the wire: either a bare boolean
/// (legacy) or the structured `{valid, errors}` object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValidationResponse {
    Legacy(bool),
    Structured(ValidationResult),
}

impl From<ValidationResponse> for ValidationResult {
    fn from(response: ValidationResponse) -> Self {
        match response {
            ValidationResponse::Legacy(valid) => valid.into(),
            ValidationResponse::Structured(result) => result,
        }
    }
}

/// Report every key from `required` that is absent from `inputs`
pub fn validate_required(inputs: &ValueMap, required: &[String]) -> ValidationResult {
    let errors: Vec<String> = required
        .iter()
        .filter(|key| inputs.get(key.as_str()).map_or(true, |v| v.is_null()))
        .map(|key| format!("Missing required input: {}", key))
        .collect();

    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::invalid(errors)
    }
}

/// Full executor response stored on the step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub outputs: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(
        default,
        alias = "executionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_time_ms: Option<u64>,
    #[serde(default, alias = "gasUsed", skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
}

impl NodeExecutionResult {
    pub fn success(outputs: ValueMap) -> Self {
        Self {
            success: true,
            outputs,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn with_gas_used(mut self, gas: u64) -> Self {
        self.gas_used = Some(gas);
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use serde_json::json;

    #[test]
    fn legacy_boolean_validation_is_accepted() {
        let response: ValidationResponse = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(ValidationResult::from(response), ValidationResult::invalid(vec![]));

        let response: ValidationResponse =
            serde_json::from_value(json!({"valid": false, "errors": ["amount missing"]}))
                .unwrap();
        let result = ValidationResult::from(response);
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["amount missing".to_string()]);
    }

    #[test]
    fn required_inputs_treat_null_as_missing() {
        let mut inputs = ValueMap::new();
        inputs.insert("from".into(), Value::from("ETH"));
        inputs.insert("to".into(), Value::Null);

        let result = validate_required(&inputs, &["from".into(), "to".into(), "amount".into()]);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn result_parses_camel_case_aliases() {
        let result: NodeExecutionResult = serde_json::from_value(json!({
            "success": true,
            "outputs": {"txHash": "0xabc"},
            "executionTime": 12,
            "gasUsed": 21000
        }))
        .unwrap();

        assert_eq!(result.execution_time_ms, Some(12));
        assert_eq!(result.gas_used, Some(21000));
        assert_eq!(result.outputs["txHash"].as_str(), Some("0xabc"));
    }

    #[test]
    fn merge_keeps_all_errors() {
        let merged = ValidationResult::invalid(vec!["a".into()])
            .merge(ValidationResult::ok())
            .merge(ValidationResult::invalid(vec!["b".into()]));
        assert!(!merged.valid);
        assert_eq!(merged.errors, vec!["a".to_string(), "b".to_string()]);
    }
}
