use crate::{ExecutionId, Value, ValueMap, WorkflowId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-execution context handed to every executor call.
///
/// `variables` is shared by every step of the execution. Access is not
/// serialized between steps of the same round: executors that write to it
/// must tolerate sibling steps writing concurrently.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub variables: Arc<RwLock<ValueMap>>,
    pub secrets: HashMap<String, String>,
    pub user_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        execution_id: ExecutionId,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id,
            environment: environment.into(),
            started_at: Utc::now(),
            variables: Arc::new(RwLock::new(ValueMap::new())),
            secrets: HashMap::new(),
            user_id: None,
        }
    }

    pub async fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.read().await.get(name).cloned()
    }

    pub async fn set_variable(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.write().await.insert(name.into(), value.into());
    }

    pub async fn variables_snapshot(&self) -> ValueMap {
        self.variables.read().await.clone()
    }

    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }
}

/// Caller-supplied part of the context for `execute_workflow`
#[derive(Debug, Clone, Default)]
pub struct PartialContext {
    pub environment: Option<String>,
    pub variables: ValueMap,
    pub secrets: HashMap<String, String>,
    pub user_id: Option<String>,
}

impl PartialContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Complete the context for one execution
    pub fn into_context(
        self,
        workflow_id: impl Into<WorkflowId>,
        execution_id: ExecutionId,
        default_environment: &str,
    ) -> ExecutionContext {
        let environment = self
            .environment
            .unwrap_or_else(|| default_environment.to_string());
        let mut ctx = ExecutionContext::new(workflow_id, execution_id, environment);
        ctx.variables = Arc::new(RwLock::new(self.variables));
        ctx.secrets = self.secrets;
        ctx.user_id = self.user_id;
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn clones_share_variables() {
        let ctx = PartialContext::new()
            .with_variable("chain", "avalanche")
            .with_secret("api_key", "k")
            .into_context("wf", Uuid::new_v4(), "development");
        let sibling = ctx.clone();

        sibling.set_variable("nonce", 7i64).await;

        assert_eq!(ctx.get_variable("nonce").await, Some(Value::Integer(7)));
        assert_eq!(ctx.get_variable("chain").await.unwrap().as_str(), Some("avalanche"));
        assert_eq!(ctx.environment, "development");
        assert_eq!(ctx.secret("api_key"), Some("k"));
    }
}
