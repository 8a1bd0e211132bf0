use dagcore::{Executor, ExecutorMetadata};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of executors keyed by node type
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Register an executor; a later registration for the same type replaces it
    pub fn register(&self, node_type: impl Into<String>, executor: Arc<dyn Executor>) {
        let node_type = node_type.into();
        tracing::debug!("Registering executor for node type: {}", node_type);
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        if executors.insert(node_type.clone(), executor).is_some() {
            tracing::debug!("Replaced previous executor for node type: {}", node_type);
        }
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn Executor>> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.contains_key(node_type)
    }

    /// Registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        let mut types: Vec<String> = executors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<ExecutorMetadata> {
        self.get(node_type).map(|e| e.metadata())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
