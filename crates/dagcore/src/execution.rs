use crate::{ExecutionContext, ExecutionId, InvalidTransition, NodeId, Step, StepStatus, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// One run of a workflow definition
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub steps: HashMap<NodeId, Step>,
    /// Node ids in workflow declaration order
    pub order: Vec<NodeId>,
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Execution {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            id: context.execution_id,
            workflow_id: context.workflow_id.clone(),
            status: ExecutionStatus::Pending,
            steps: HashMap::new(),
            order: Vec::new(),
            started_at: context.started_at,
            context,
            ended_at: None,
            error: None,
        }
    }

    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::Execution {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn step(&self, node_id: &str) -> Option<&Step> {
        self.steps.get(node_id)
    }

    /// Steps in declaration order
    pub fn ordered_steps(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    pub fn stats(&self) -> ExecutionStats {
        let count = |status: StepStatus| self.steps.values().filter(|s| s.status == status).count();
        let end = self.ended_at.unwrap_or_else(Utc::now);

        ExecutionStats {
            total_steps: self.steps.len(),
            completed_steps: count(StepStatus::Completed),
            failed_steps: count(StepStatus::Failed),
            total_gas_used: self.steps.values().map(Step::gas_used).sum(),
            duration_ms: (end - self.started_at).num_milliseconds().max(0) as u64,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Aggregate view returned by `get_execution_stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub total_gas_used: u64,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeExecutionResult, ValueMap};
    use uuid::Uuid;

    fn execution() -> Execution {
        Execution::new(ExecutionContext::new("wf", Uuid::new_v4(), "test"))
    }

    #[test]
    fn terminal_transition_stamps_end_time() {
        let mut exec = execution();
        exec.transition(ExecutionStatus::Running).unwrap();
        assert!(exec.ended_at.is_none());
        exec.transition(ExecutionStatus::Cancelled).unwrap();
        assert!(exec.ended_at.is_some());
        assert!(exec.transition(ExecutionStatus::Completed).is_err());
    }

    #[test]
    fn stats_count_steps_and_gas() {
        let mut exec = execution();
        for (id, gas, ok) in [("a", 100, true), ("b", 50, false), ("c", 0, true)] {
            let mut step = Step::new(id, "mock", ValueMap::new());
            if id != "c" {
                step.start().unwrap();
                let result = NodeExecutionResult::success(ValueMap::new()).with_gas_used(gas);
                if ok {
                    step.complete(result).unwrap();
                } else {
                    step.fail("no", Some(result)).unwrap();
                }
            }
            exec.order.push(id.to_string());
            exec.steps.insert(id.to_string(), step);
        }

        let stats = exec.stats();
        assert_eq!(stats.total_steps, 3);
        assert_eq!(stats.completed_steps, 1);
        assert_eq!(stats.failed_steps, 1);
        assert_eq!(stats.total_gas_used, 150);
        assert_eq!(
            exec.ordered_steps().map(|s| s.node_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }
}
