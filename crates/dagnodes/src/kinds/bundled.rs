use crate::builtin_executors;
use dagcore::{Executor, NodeError};
use dagruntime::{ExecutorKind, PluginDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves a record to one of the executors shipped with this crate,
/// named by the `executor` config key
pub struct BundledKind {
    bundled: HashMap<&'static str, Arc<dyn Executor>>,
}

impl BundledKind {
    pub fn new() -> Self {
        Self {
            bundled: builtin_executors().into_iter().collect(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.bundled.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BundledKind {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorKind for BundledKind {
    fn kind(&self) -> &str {
        "bundled"
    }

    fn build(&self, plugin: &PluginDefinition) -> Result<Arc<dyn Executor>, NodeError> {
        let name = plugin.require_str("executor")?;
        self.bundled.get(name).cloned().ok_or_else(|| {
            NodeError::Configuration(format!(
                "Unknown bundled executor '{}'; available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }
}
