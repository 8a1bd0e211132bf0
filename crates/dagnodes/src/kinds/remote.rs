use super::{context_json, map_to_json};
use async_trait::async_trait;
use dagcore::{
    ExecutionContext, Executor, NodeError, NodeExecutionResult, ValidationResponse,
    ValidationResult, Value, ValueMap,
};
use dagruntime::{ExecutorKind, PluginDefinition};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Builds executors that delegate to an HTTP endpoint.
///
/// Record config:
/// - `endpoint` (required): receives `POST {inputs, context}` and answers
///   with a node execution result
/// - `validate_endpoint`: receives `POST {inputs}` and answers either
///   `{valid, errors}` or a bare boolean
/// - `timeout_ms`: per-request timeout, default 30s
pub struct HttpKind {
    client: reqwest::Client,
}

impl HttpKind {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpKind {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorKind for HttpKind {
    fn kind(&self) -> &str {
        "http"
    }

    fn build(&self, plugin: &PluginDefinition) -> Result<Arc<dyn Executor>, NodeError> {
        let endpoint = parse_url(plugin.require_str("endpoint")?)?;
        let validate_endpoint = match plugin.config.get("validate_endpoint") {
            None | Some(Value::Null) => None,
            Some(Value::String(url)) => Some(parse_url(url)?),
            Some(_) => {
                return Err(NodeError::Configuration(
                    "validate_endpoint must be a string".to_string(),
                ))
            }
        };
        let timeout_ms = plugin
            .config
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Arc::new(HttpExecutor {
            name: format!("{} (http)", plugin.node_type),
            client: self.client.clone(),
            endpoint,
            validate_endpoint,
            timeout_ms,
        }))
    }
}

fn parse_url(raw: &str) -> Result<reqwest::Url, NodeError> {
    reqwest::Url::parse(raw)
        .map_err(|e| NodeError::Configuration(format!("Invalid endpoint '{}': {}", raw, e)))
}

pub struct HttpExecutor {
    name: String,
    client: reqwest::Client,
    endpoint: reqwest::Url,
    validate_endpoint: Option<reqwest::Url>,
    timeout_ms: u64,
}

impl HttpExecutor {
    async fn post<T: DeserializeOwned>(
        &self,
        url: &reqwest::Url,
        body: &serde_json::Value,
    ) -> Result<T, NodeError> {
        let exchange = async {
            let response = self
                .client
                .post(url.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(NodeError::ExecutionFailed(format!(
                    "{} answered {}: {}",
                    url, status, text
                )));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("Malformed response from {}: {}", url, e)))
        };

        tokio::time::timeout(Duration::from_millis(self.timeout_ms), exchange)
            .await
            .map_err(|_| NodeError::Timeout { ms: self.timeout_ms })?
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, inputs: &ValueMap) -> ValidationResult {
        let Some(url) = &self.validate_endpoint else {
            return ValidationResult::ok();
        };

        match self
            .post::<ValidationResponse>(url, &json!({ "inputs": map_to_json(inputs) }))
            .await
        {
            Ok(response) => response.into(),
            Err(e) => ValidationResult::invalid(vec![format!("Validation request failed: {}", e)]),
        }
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let body = json!({
            "inputs": map_to_json(inputs),
            "context": context_json(ctx).await,
        });
        tracing::debug!("POST {} for execution {}", self.endpoint, ctx.execution_id);
        self.post(&self.endpoint, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_must_be_a_url() {
        let kind = HttpKind::new();
        let err = kind
            .build(&PluginDefinition::new("remote", "http").with_config("endpoint", "not a url"))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::Configuration(_)));

        assert!(kind
            .build(&PluginDefinition::new("remote", "http").with_config("endpoint", "http://127.0.0.1:9/run"))
            .is_ok());
    }

    #[tokio::test]
    async fn unreachable_validator_reports_invalid() {
        let exec = HttpKind::new()
            .build(
                &PluginDefinition::new("remote", "http")
                    .with_config("endpoint", "http://127.0.0.1:9/run")
                    .with_config("validate_endpoint", "http://127.0.0.1:9/validate")
                    .with_config("timeout_ms", 2000i64),
            )
            .unwrap();

        let result = exec.validate(&ValueMap::new()).await;
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }
}
