use crate::scheduler::SharedExecution;
use chrono::Utc;
use dagcore::{Execution, ExecutionId, ExecutionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory table of executions keyed by id
#[derive(Clone, Default)]
pub struct ExecutionStore {
    executions: Arc<RwLock<HashMap<ExecutionId, SharedExecution>>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, execution: Execution) -> SharedExecution {
        let id = execution.id;
        let shared = Arc::new(RwLock::new(execution));
        self.executions.write().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: ExecutionId) -> Option<SharedExecution> {
        self.executions.read().await.get(&id).cloned()
    }

    /// Point-in-time copy of an execution record
    pub async fn snapshot(&self, id: ExecutionId) -> Option<Execution> {
        let shared = self.get(id).await?;
        let exec = shared.read().await;
        Some(exec.clone())
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict executions that started more than `max_age` ago and are not running.
    /// Returns the number evicted.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut executions = self.executions.write().await;
        let mut expired = Vec::new();
        for (id, shared) in executions.iter() {
            let exec = shared.read().await;
            if exec.started_at < cutoff && exec.status != ExecutionStatus::Running {
                expired.push(*id);
            }
        }

        for id in &expired {
            executions.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!("Evicted {} executions older than {:?}", expired.len(), max_age);
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcore::ExecutionContext;
    use uuid::Uuid;

    fn aged(status: ExecutionStatus, age_secs: i64) -> Execution {
        let mut exec = Execution::new(ExecutionContext::new("wf", Uuid::new_v4(), "test"));
        exec.status = status;
        exec.started_at = Utc::now() - chrono::Duration::seconds(age_secs);
        exec
    }

    #[tokio::test]
    async fn cleanup_never_evicts_running_executions() {
        let store = ExecutionStore::new();
        let running = store.insert(aged(ExecutionStatus::Running, 7200)).await;
        let done = store.insert(aged(ExecutionStatus::Completed, 7200)).await;
        let fresh = store.insert(aged(ExecutionStatus::Failed, 10)).await;

        let evicted = store.cleanup(Duration::from_secs(3600)).await;

        assert_eq!(evicted, 1);
        assert!(store.get(running.read().await.id).await.is_some());
        assert!(store.get(done.read().await.id).await.is_none());
        assert!(store.get(fresh.read().await.id).await.is_some());
    }

    #[tokio::test]
    async fn huge_max_age_evicts_nothing() {
        let store = ExecutionStore::new();
        store.insert(aged(ExecutionStatus::Completed, 60)).await;
        assert_eq!(store.cleanup(Duration::MAX).await, 0);
        assert_eq!(store.len().await, 1);
    }
}
