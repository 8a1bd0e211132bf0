use async_trait::async_trait;
use dagcore::{
    validate_required, ExecutionContext, Executor, ExecutorMetadata, NodeError,
    NodeExecutionResult, ValidationResult, Value, ValueMap,
};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// HTTP request node
pub struct HttpRequestExecutor {
    client: reqwest::Client,
}

impl HttpRequestExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: &str, url: &str, inputs: &ValueMap) -> Result<reqwest::RequestBuilder, NodeError> {
        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "DELETE" => self.client.delete(url),
            "POST" => with_body(self.client.post(url), inputs.get("body")),
            "PUT" => with_body(self.client.put(url), inputs.get("body")),
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        // Add headers if provided
        let request = if let Some(Value::Object(headers)) = inputs.get("headers") {
            headers.iter().fold(request, |req, (key, value)| match value.as_str() {
                Some(val) => req.header(key, val),
                None => req,
            })
        } else {
            request
        };
        Ok(request)
    }
}

impl Default for HttpRequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn with_body(request: reqwest::RequestBuilder, body: Option<&Value>) -> reqwest::RequestBuilder {
    match body {
        Some(Value::String(text)) => request.body(text.clone()),
        Some(value) if !value.is_null() => request.json(&value.to_json()),
        _ => request,
    }
}

#[async_trait]
impl Executor for HttpRequestExecutor {
    fn name(&self) -> &str {
        "http.request"
    }

    async fn validate(&self, inputs: &ValueMap) -> ValidationResult {
        let mut result = validate_required(inputs, &["url".to_string()]);
        if let Some(url) = inputs.get("url") {
            if !url.is_null() && url.as_str().is_none() {
                result = result.merge(ValidationResult::invalid(vec![
                    "Input 'url' must be a string".to_string(),
                ]));
            }
        }
        result
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        _ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let url = inputs
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NodeError::MissingInput("url".to_string()))?;
        let method = inputs.get("method").and_then(|v| v.as_str()).unwrap_or("GET");
        let timeout_ms = inputs
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        tracing::info!("{} {}", method, url);
        let request = self.request(method, url, inputs)?;

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

            let status = response.status().as_u16();
            let headers: ValueMap = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(v.to_str().unwrap_or(""))))
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;
            Ok::<_, NodeError>((status, headers, body))
        };

        let (status, headers, body) = tokio::time::timeout(Duration::from_millis(timeout_ms), exchange)
            .await
            .map_err(|_| NodeError::Timeout { ms: timeout_ms })??;

        tracing::debug!("Response status: {}", status);

        Ok(NodeExecutionResult::success(ValueMap::new())
            .with_output("status", status as u64)
            .with_output("body", body)
            .with_output("headers", headers))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_is_required_and_must_be_a_string() {
        let exec = HttpRequestExecutor::new();

        let result = exec.validate(&ValueMap::new()).await;
        assert_eq!(result.errors, vec!["Missing required input: url".to_string()]);

        let mut inputs = ValueMap::new();
        inputs.insert("url".into(), Value::from(5i64));
        assert!(!exec.validate(&inputs).await.valid);

        inputs.insert("url".into(), Value::from("http://localhost"));
        assert!(exec.validate(&inputs).await.valid);
    }

    #[test]
    fn unsupported_method_is_a_configuration_error() {
        let exec = HttpRequestExecutor::new();
        let err = exec.request("PATCHY", "http://localhost", &ValueMap::new()).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }
}
