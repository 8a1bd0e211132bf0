use crate::{InvalidTransition, NodeExecutionResult, NodeId, ValueMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Transitions only move forward: pending -> running -> completed | failed.
    /// A step whose executor cannot be resolved fails straight from pending.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Failed)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// Runtime record of one node within one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub node_id: NodeId,
    pub node_type: String,
    pub status: StepStatus,
    /// Static node configuration until the step starts, then the merged inputs
    pub inputs: ValueMap,
    pub outputs: ValueMap,
    pub dependencies: Vec<NodeId>,
    pub result: Option<NodeExecutionResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(node_id: impl Into<NodeId>, node_type: impl Into<String>, config: ValueMap) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            status: StepStatus::Pending,
            inputs: config,
            outputs: ValueMap::new(),
            dependencies: Vec::new(),
            result: None,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    fn transition(&mut self, next: StepStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition::Step {
                node_id: self.node_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(StepStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, result: NodeExecutionResult) -> Result<(), InvalidTransition> {
        self.transition(StepStatus::Completed)?;
        self.outputs = result.outputs.clone();
        self.result = Some(result);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failure; a result is kept when the executor produced one
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        result: Option<NodeExecutionResult>,
    ) -> Result<(), InvalidTransition> {
        self.transition(StepStatus::Failed)?;
        if let Some(result) = result {
            self.outputs = result.outputs.clone();
            self.result = Some(result);
        }
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn gas_used(&self) -> u64 {
        self.result.as_ref().and_then(|r| r.gas_used).unwrap_or(0)
    }

    /// Elapsed time between start and end, in milliseconds
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_records_outputs_and_timestamps() {
        let mut step = Step::new("a", "echo", ValueMap::new());
        step.start().unwrap();
        step.complete(NodeExecutionResult::success(ValueMap::new()).with_output("x", 1i64))
            .unwrap();

        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.outputs["x"].as_f64(), Some(1.0));
        assert!(step.started_at.unwrap() <= step.ended_at.unwrap());
    }

    #[test]
    fn status_never_reverts() {
        let mut step = Step::new("a", "echo", ValueMap::new());
        step.start().unwrap();
        step.fail("boom", None).unwrap();

        assert!(step.start().is_err());
        assert!(step.complete(NodeExecutionResult::success(ValueMap::new())).is_err());
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("boom"));
    }

    #[test]
    fn pending_step_cannot_complete_without_running() {
        let mut step = Step::new("a", "echo", ValueMap::new());
        let err = step
            .complete(NodeExecutionResult::success(ValueMap::new()))
            .unwrap_err();
        assert_eq!(
            err,
            InvalidTransition::Step {
                node_id: "a".into(),
                from: StepStatus::Pending,
                to: StepStatus::Completed,
            }
        );
    }

    #[test]
    fn failed_result_keeps_partial_outputs() {
        let mut step = Step::new("a", "mock", ValueMap::new());
        step.start().unwrap();
        let result = NodeExecutionResult::failure("reverted")
            .with_output("tx", "0x1")
            .with_gas_used(500);
        step.fail("reverted", Some(result)).unwrap();

        assert_eq!(step.outputs["tx"].as_str(), Some("0x1"));
        assert_eq!(step.gas_used(), 500);
    }
}
