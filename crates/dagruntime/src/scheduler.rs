use crate::collector::{collect_inputs, NormalizationRules};
use crate::registry::ExecutorRegistry;
use chrono::Utc;
use dagcore::{
    EngineError, EventBus, Execution, ExecutionContext, ExecutionError, ExecutionEvent,
    ExecutionId, ExecutionStatus, Executor, NodeError, NodeExecutionResult, NodeId, Step,
    StepStatus, ValueMap,
};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Execution record shared between the scheduler and engine accessors
pub type SharedExecution = Arc<RwLock<Execution>>;

/// What the scheduler should do next
#[derive(Debug, Clone, PartialEq)]
pub enum Frontier {
    /// Pending steps whose dependencies have all completed
    Runnable(Vec<NodeId>),
    /// Nothing left to run; `blocked` lists pending steps stuck behind a failure
    Settled { blocked: Vec<NodeId> },
    /// Open steps remain but none can run and no failure explains it
    Deadlock(Vec<NodeId>),
}

/// Compute the next round from the current step states
pub fn plan_round(steps: &HashMap<NodeId, Step>, order: &[NodeId]) -> Frontier {
    let status_of = |id: &str| steps.get(id).map(|s| s.status);

    let open: Vec<&Step> = order
        .iter()
        .filter_map(|id| steps.get(id))
        .filter(|s| !s.status.is_terminal())
        .collect();
    if open.is_empty() {
        return Frontier::Settled {
            blocked: Vec::new(),
        };
    }

    let runnable: Vec<NodeId> = open
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter(|s| {
            s.dependencies
                .iter()
                .all(|dep| status_of(dep) == Some(StepStatus::Completed))
        })
        .map(|s| s.node_id.clone())
        .collect();
    if !runnable.is_empty() {
        return Frontier::Runnable(runnable);
    }

    // Pending steps downstream (transitively) of a failed step can never run
    let mut blocked: HashSet<&str> = HashSet::new();
    loop {
        let before = blocked.len();
        for step in &open {
            if step.status != StepStatus::Pending || blocked.contains(step.node_id.as_str()) {
                continue;
            }
            let behind_failure = step.dependencies.iter().any(|dep| {
                status_of(dep) == Some(StepStatus::Failed) || blocked.contains(dep.as_str())
            });
            if behind_failure {
                blocked.insert(step.node_id.as_str());
            }
        }
        if blocked.len() == before {
            break;
        }
    }

    let stuck: Vec<NodeId> = open
        .iter()
        .filter(|s| !blocked.contains(s.node_id.as_str()))
        .map(|s| s.node_id.clone())
        .collect();

    if stuck.is_empty() {
        Frontier::Settled {
            blocked: open.iter().map(|s| s.node_id.clone()).collect(),
        }
    } else {
        Frontier::Deadlock(stuck)
    }
}

/// Identity of the step being executed, used to build scoped errors
struct StepRef {
    execution_id: ExecutionId,
    node_id: NodeId,
    node_type: String,
}

impl StepRef {
    fn missing_executor(&self) -> ExecutionError {
        ExecutionError::MissingExecutor {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
        }
    }

    fn validation(&self, errors: Vec<String>) -> ExecutionError {
        ExecutionError::Validation {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            errors,
        }
    }

    fn failed(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::NodeFailed {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            message: message.into(),
        }
    }

    fn fault(&self, source: NodeError) -> ExecutionError {
        ExecutionError::Fault {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            node_type: self.node_type.clone(),
            source,
        }
    }
}

/// Runs an execution round by round: every step whose dependencies are
/// complete starts at once, and the next round begins when all of them
/// have settled. A failing step is recorded without stopping its siblings.
pub struct Scheduler<'a> {
    registry: &'a ExecutorRegistry,
    event_bus: &'a EventBus,
    rules: &'a NormalizationRules,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        registry: &'a ExecutorRegistry,
        event_bus: &'a EventBus,
        rules: &'a NormalizationRules,
    ) -> Self {
        Self {
            registry,
            event_bus,
            rules,
        }
    }

    /// Drive the execution to a terminal state
    pub async fn run(&self, execution: &SharedExecution) -> Result<(), EngineError> {
        let execution_id = {
            let mut exec = execution.write().await;
            exec.transition(ExecutionStatus::Running)?;
            self.event_bus.emit(ExecutionEvent::ExecutionStarted {
                execution_id: exec.id,
                workflow_id: exec.workflow_id.clone(),
                total_steps: exec.steps.len(),
                timestamp: Utc::now(),
            });
            tracing::info!(
                "Execution {} started: workflow {} with {} steps",
                exec.id,
                exec.workflow_id,
                exec.steps.len()
            );
            exec.id
        };

        let mut round = 0usize;
        loop {
            let frontier = {
                let exec = execution.read().await;
                if exec.status == ExecutionStatus::Cancelled {
                    tracing::info!("Execution {} cancelled; no further rounds", execution_id);
                    return Err(EngineError::Cancelled(execution_id));
                }
                plan_round(&exec.steps, &exec.order)
            };

            match frontier {
                Frontier::Runnable(ready) => {
                    round += 1;
                    tracing::debug!("Execution {} round {}: {:?}", execution_id, round, ready);

                    let mut in_flight: FuturesUnordered<_> = ready
                        .into_iter()
                        .map(|node_id| self.execute_step(execution, node_id))
                        .collect();

                    while let Some(outcome) = in_flight.next().await {
                        if let Err(e) = outcome {
                            tracing::warn!("{}", e);
                        }
                    }
                }
                Frontier::Settled { blocked } => {
                    if !blocked.is_empty() {
                        tracing::warn!(
                            "Execution {}: steps {:?} blocked by failed dependencies",
                            execution_id,
                            blocked
                        );
                    }
                    break;
                }
                Frontier::Deadlock(pending) => {
                    let err = ExecutionError::Deadlock {
                        execution_id,
                        pending,
                    };
                    tracing::error!("{}", err);
                    self.fail_execution(execution, &err).await;
                    return Err(err.into());
                }
            }
        }

        self.finish(execution).await
    }

    /// Decide the outcome once no more rounds can run
    async fn finish(&self, execution: &SharedExecution) -> Result<(), EngineError> {
        let mut exec = execution.write().await;
        if exec.status == ExecutionStatus::Cancelled {
            return Err(EngineError::Cancelled(exec.id));
        }

        let first_failed = exec
            .ordered_steps()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| {
                (
                    s.node_id.clone(),
                    s.node_type.clone(),
                    s.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            });

        match first_failed {
            Some((node_id, node_type, message)) => {
                let err = ExecutionError::StepFailed {
                    execution_id: exec.id,
                    node_id: node_id.clone(),
                    node_type,
                    message,
                };
                exec.error = Some(err.to_string());
                exec.transition(ExecutionStatus::Failed)?;
                self.event_bus.emit(ExecutionEvent::ExecutionFailed {
                    execution_id: exec.id,
                    error: err.to_string(),
                    node_id: Some(node_id),
                    timestamp: Utc::now(),
                });
                tracing::warn!("Execution {} failed: {}", exec.id, err);
                Err(err.into())
            }
            None => {
                exec.transition(ExecutionStatus::Completed)?;
                let stats = exec.stats();
                self.event_bus.emit(ExecutionEvent::ExecutionCompleted {
                    execution_id: exec.id,
                    duration_ms: stats.duration_ms,
                    total_gas_used: stats.total_gas_used,
                    timestamp: Utc::now(),
                });
                tracing::info!(
                    "Execution {} completed: {} steps in {}ms",
                    exec.id,
                    stats.completed_steps,
                    stats.duration_ms
                );
                Ok(())
            }
        }
    }

    async fn fail_execution(&self, execution: &SharedExecution, err: &ExecutionError) {
        let mut exec = execution.write().await;
        if exec.status != ExecutionStatus::Running {
            return;
        }
        exec.error = Some(err.to_string());
        if let Err(e) = exec.transition(ExecutionStatus::Failed) {
            tracing::error!("{}", e);
            return;
        }
        self.event_bus.emit(ExecutionEvent::ExecutionFailed {
            execution_id: exec.id,
            error: err.to_string(),
            node_id: err.node_id().map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    /// Execute one step. Failures are recorded on the step and emitted as
    /// `node.failed` before being returned.
    async fn execute_step(
        &self,
        execution: &SharedExecution,
        node_id: NodeId,
    ) -> Result<(), ExecutionError> {
        let (step_ref, ctx) = {
            let exec = execution.read().await;
            let node_type = exec
                .steps
                .get(&node_id)
                .map(|s| s.node_type.clone())
                .unwrap_or_default();
            (
                StepRef {
                    execution_id: exec.id,
                    node_id,
                    node_type,
                },
                exec.context.clone(),
            )
        };

        let Some(executor) = self.registry.get(&step_ref.node_type) else {
            let err = step_ref.missing_executor();
            self.record_failure(execution, &step_ref, &err, None, 0).await;
            return Err(err);
        };

        let inputs = match self.start_step(execution, &step_ref).await {
            Ok(inputs) => inputs,
            Err(err) => {
                tracing::error!("{}", err);
                return Err(err);
            }
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.invoke(executor.as_ref(), &inputs, &ctx, &step_ref))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(step_ref.fault(NodeError::ExecutionFailed(format!(
                    "executor panicked: {}",
                    panic_message(panic.as_ref())
                ))))
            });
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) if result.success => {
                result.execution_time_ms.get_or_insert(duration_ms);
                self.record_success(execution, &step_ref, result, duration_ms)
                    .await
            }
            Ok(result) => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Node execution failed".to_string());
                let err = step_ref.failed(message);
                self.record_failure(execution, &step_ref, &err, Some(result), duration_ms)
                    .await;
                Err(err)
            }
            Err(err) => {
                self.record_failure(execution, &step_ref, &err, None, duration_ms)
                    .await;
                Err(err)
            }
        }
    }

    /// Mark the step running, emit `node.started` and collect its inputs
    async fn start_step(
        &self,
        execution: &SharedExecution,
        step_ref: &StepRef,
    ) -> Result<ValueMap, ExecutionError> {
        let mut exec = execution.write().await;

        let step = exec
            .steps
            .get_mut(&step_ref.node_id)
            .ok_or_else(|| step_ref.failed("step record missing"))?;
        step.start().map_err(|e| step_ref.failed(e.to_string()))?;

        self.event_bus.emit(ExecutionEvent::NodeStarted {
            execution_id: step_ref.execution_id,
            node_id: step_ref.node_id.clone(),
            node_type: step_ref.node_type.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Step {} ({}) started in execution {}",
            step_ref.node_id,
            step_ref.node_type,
            step_ref.execution_id
        );

        let inputs = {
            let step = &exec.steps[&step_ref.node_id];
            collect_inputs(step, &exec.steps, &exec.order, self.rules)
        };
        if let Some(step) = exec.steps.get_mut(&step_ref.node_id) {
            step.inputs = inputs.clone();
        }
        Ok(inputs)
    }

    async fn invoke(
        &self,
        executor: &dyn Executor,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
        step_ref: &StepRef,
    ) -> Result<NodeExecutionResult, ExecutionError> {
        let validation = executor.validate(inputs).await;
        if !validation.valid {
            let errors = if validation.errors.is_empty() {
                vec!["Invalid inputs".to_string()]
            } else {
                validation.errors
            };
            return Err(step_ref.validation(errors));
        }

        executor
            .execute(inputs, ctx)
            .await
            .map_err(|e| step_ref.fault(e))
    }

    async fn record_success(
        &self,
        execution: &SharedExecution,
        step_ref: &StepRef,
        result: NodeExecutionResult,
        duration_ms: u64,
    ) -> Result<(), ExecutionError> {
        let mut exec = execution.write().await;
        let step = exec
            .steps
            .get_mut(&step_ref.node_id)
            .ok_or_else(|| step_ref.failed("step record missing"))?;

        let outputs = result.outputs.clone();
        let gas_used = result.gas_used;
        step.complete(result)
            .map_err(|e| step_ref.failed(e.to_string()))?;

        self.event_bus.emit(ExecutionEvent::NodeCompleted {
            execution_id: step_ref.execution_id,
            node_id: step_ref.node_id.clone(),
            node_type: step_ref.node_type.clone(),
            outputs,
            duration_ms,
            gas_used,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Step {} ({}) completed in {}ms",
            step_ref.node_id,
            step_ref.node_type,
            duration_ms
        );
        Ok(())
    }

    async fn record_failure(
        &self,
        execution: &SharedExecution,
        step_ref: &StepRef,
        err: &ExecutionError,
        result: Option<NodeExecutionResult>,
        duration_ms: u64,
    ) {
        let mut exec = execution.write().await;
        let Some(step) = exec.steps.get_mut(&step_ref.node_id) else {
            return;
        };
        if let Err(e) = step.fail(step_message(err), result) {
            tracing::error!("{}", e);
            return;
        }

        self.event_bus.emit(ExecutionEvent::NodeFailed {
            execution_id: step_ref.execution_id,
            node_id: step_ref.node_id.clone(),
            node_type: step_ref.node_type.clone(),
            error: err.to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}

/// Message stored on the failed step, without the node prefix
fn step_message(err: &ExecutionError) -> String {
    match err {
        ExecutionError::NodeFailed { message, .. } => message.clone(),
        ExecutionError::Fault { source, .. } => source.to_string(),
        ExecutionError::Validation { errors, .. } => {
            format!("Validation failed: {}", errors.join("; "))
        }
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, status: StepStatus, deps: &[&str]) -> Step {
        let mut step = Step::new(id, "echo", ValueMap::new());
        step.status = status;
        step.dependencies = deps.iter().map(|d| d.to_string()).collect();
        step
    }

    fn table(steps: Vec<Step>) -> (HashMap<NodeId, Step>, Vec<NodeId>) {
        let order = steps.iter().map(|s| s.node_id.clone()).collect();
        let map = steps.into_iter().map(|s| (s.node_id.clone(), s)).collect();
        (map, order)
    }

    #[test]
    fn roots_are_runnable_first() {
        let (steps, order) = table(vec![
            step("a", StepStatus::Pending, &[]),
            step("b", StepStatus::Pending, &["a"]),
            step("c", StepStatus::Pending, &[]),
        ]);
        assert_eq!(
            plan_round(&steps, &order),
            Frontier::Runnable(vec!["a".into(), "c".into()])
        );
    }

    #[test]
    fn all_terminal_is_settled() {
        let (steps, order) = table(vec![
            step("a", StepStatus::Completed, &[]),
            step("b", StepStatus::Failed, &["a"]),
        ]);
        assert_eq!(
            plan_round(&steps, &order),
            Frontier::Settled { blocked: vec![] }
        );
    }

    #[test]
    fn steps_behind_failure_are_blocked_not_deadlocked() {
        // a fails; b depends on a; d depends on b and on completed c
        let (steps, order) = table(vec![
            step("a", StepStatus::Failed, &[]),
            step("b", StepStatus::Pending, &["a"]),
            step("c", StepStatus::Completed, &[]),
            step("d", StepStatus::Pending, &["b", "c"]),
        ]);
        assert_eq!(
            plan_round(&steps, &order),
            Frontier::Settled {
                blocked: vec!["b".into(), "d".into()]
            }
        );
    }

    #[test]
    fn stuck_running_dependency_is_a_deadlock() {
        let (steps, order) = table(vec![
            step("a", StepStatus::Running, &[]),
            step("b", StepStatus::Pending, &["a"]),
        ]);
        assert_eq!(
            plan_round(&steps, &order),
            Frontier::Deadlock(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn unknown_dependency_is_a_deadlock() {
        let (steps, order) = table(vec![step("b", StepStatus::Pending, &["ghost"])]);
        assert_eq!(plan_round(&steps, &order), Frontier::Deadlock(vec!["b".into()]));
    }

    #[test]
    fn step_message_strips_node_prefix() {
        let err = ExecutionError::NodeFailed {
            execution_id: uuid::Uuid::nil(),
            node_id: "a".into(),
            node_type: "echo".into(),
            message: "boom".into(),
        };
        assert_eq!(step_message(&err), "boom");
    }
}
