//! Declarative executor records and the kinds that turn them into executors.
//!
//! A `PluginDefinition` names a node type and an executor kind ("script",
//! "http", "mock", ...). The `KindRegistry` maps each kind to an
//! `ExecutorKind` strategy that builds a concrete `Executor` from the
//! record. New kinds are added by registering another strategy; the
//! scheduler only ever sees the resulting `Executor`.

use async_trait::async_trait;
use dagcore::{
    validate_required, ExecutionContext, Executor, ExecutorMetadata, NodeError,
    NodeExecutionResult, ValidationResult, ValueMap,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Declarative executor record, usually loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDefinition {
    /// Node type the resulting executor is registered under
    pub node_type: String,
    /// Executor kind tag selecting the strategy
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Input keys that must be present (and non-null) before execution
    #[serde(default)]
    pub required_inputs: Vec<String>,
    /// Kind-specific settings (script source, endpoint, canned outputs...)
    #[serde(default)]
    pub config: ValueMap,
}

impl PluginDefinition {
    pub fn new(node_type: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            kind: kind.into(),
            name: None,
            description: None,
            category: None,
            required_inputs: Vec::new(),
            config: ValueMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<dagcore::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_required_input(mut self, key: impl Into<String>) -> Self {
        self.required_inputs.push(key.into());
        self
    }

    /// Required string setting from `config`
    pub fn require_str(&self, key: &str) -> Result<&str, NodeError> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                NodeError::Configuration(format!(
                    "Plugin '{}' is missing string config '{}'",
                    self.node_type, key
                ))
            })
    }
}

/// Strategy that builds executors for one kind tag
pub trait ExecutorKind: Send + Sync {
    fn kind(&self) -> &str;

    fn build(&self, plugin: &PluginDefinition) -> Result<Arc<dyn Executor>, NodeError>;
}

/// Registry of executor kinds keyed by tag
pub struct KindRegistry {
    kinds: RwLock<HashMap<String, Arc<dyn ExecutorKind>>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self {
            kinds: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, kind: Arc<dyn ExecutorKind>) {
        let tag = kind.kind().to_string();
        tracing::debug!("Registering executor kind: {}", tag);
        let mut kinds = self.kinds.write().unwrap_or_else(|e| e.into_inner());
        kinds.insert(tag, kind);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn ExecutorKind>> {
        let kinds = self.kinds.read().unwrap_or_else(|e| e.into_inner());
        kinds.get(tag).cloned()
    }

    pub fn list_kinds(&self) -> Vec<String> {
        let kinds = self.kinds.read().unwrap_or_else(|e| e.into_inner());
        let mut tags: Vec<String> = kinds.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor built from a plugin record: checks declared required inputs,
/// then delegates to the kind's executor
pub struct PluginExecutor {
    name: String,
    metadata: ExecutorMetadata,
    required_inputs: Vec<String>,
    inner: Arc<dyn Executor>,
}

impl PluginExecutor {
    pub fn new(plugin: &PluginDefinition, inner: Arc<dyn Executor>) -> Self {
        let mut metadata = inner.metadata();
        if let Some(description) = &plugin.description {
            metadata.description = description.clone();
        }
        if let Some(category) = &plugin.category {
            metadata.category = category.clone();
        }

        Self {
            name: plugin
                .name
                .clone()
                .unwrap_or_else(|| format!("{} ({})", plugin.node_type, plugin.kind)),
            metadata,
            required_inputs: plugin.required_inputs.clone(),
            inner,
        }
    }
}

#[async_trait]
impl Executor for PluginExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, inputs: &ValueMap) -> ValidationResult {
        let declared = validate_required(inputs, &self.required_inputs);
        if !declared.valid {
            return declared;
        }
        self.inner.validate(inputs).await
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        self.inner.execute(inputs, ctx).await
    }

    async fn estimate_gas(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<Option<u64>, NodeError> {
        self.inner.estimate_gas(inputs, ctx).await
    }

    fn metadata(&self) -> ExecutorMetadata {
        self.metadata.clone()
    }
}
