use crate::{NodeId, ValueMap, WorkflowId};
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Lifecycle events emitted during workflow execution.
///
/// Serialized as an envelope `{type, executionId, timestamp, data}` where
/// `data` holds the remaining fields in camelCase.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        total_steps: usize,
        timestamp: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        duration_ms: u64,
        total_gas_used: u64,
        timestamp: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ExecutionId,
        error: String,
        node_id: Option<NodeId>,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        outputs: ValueMap,
        duration_ms: u64,
        gas_used: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Wire name of the event, e.g. `node.completed`
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution.started",
            ExecutionEvent::ExecutionCompleted { .. } => "execution.completed",
            ExecutionEvent::ExecutionFailed { .. } => "execution.failed",
            ExecutionEvent::NodeStarted { .. } => "node.started",
            ExecutionEvent::NodeCompleted { .. } => "node.completed",
            ExecutionEvent::NodeFailed { .. } => "node.failed",
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::ExecutionFailed { execution_id, .. }
            | ExecutionEvent::NodeStarted { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::NodeFailed { execution_id, .. } => *execution_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::ExecutionStarted { timestamp, .. }
            | ExecutionEvent::ExecutionCompleted { timestamp, .. }
            | ExecutionEvent::ExecutionFailed { timestamp, .. }
            | ExecutionEvent::NodeStarted { timestamp, .. }
            | ExecutionEvent::NodeCompleted { timestamp, .. }
            | ExecutionEvent::NodeFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStarted { node_id, .. }
            | ExecutionEvent::NodeCompleted { node_id, .. }
            | ExecutionEvent::NodeFailed { node_id, .. } => Some(node_id),
            ExecutionEvent::ExecutionFailed { node_id, .. } => node_id.as_deref(),
            _ => None,
        }
    }
}

/// Per-event payload nested under `data`
#[derive(Serialize)]
#[serde(untagged)]
enum EventData<'a> {
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        workflow_id: &'a WorkflowId,
        total_steps: usize,
    },
    #[serde(rename_all = "camelCase")]
    ExecutionCompleted {
        duration_ms: u64,
        total_gas_used: u64,
    },
    #[serde(rename_all = "camelCase")]
    ExecutionFailed {
        error: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<&'a str>,
    },
    #[serde(rename_all = "camelCase")]
    NodeStarted { node_id: &'a str, node_type: &'a str },
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: &'a str,
        node_type: &'a str,
        outputs: &'a ValueMap,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        gas_used: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: &'a str,
        node_type: &'a str,
        error: &'a str,
        duration_ms: u64,
    },
}

impl ExecutionEvent {
    fn data(&self) -> EventData<'_> {
        match self {
            ExecutionEvent::ExecutionStarted {
                workflow_id,
                total_steps,
                ..
            } => EventData::ExecutionStarted {
                workflow_id,
                total_steps: *total_steps,
            },
            ExecutionEvent::ExecutionCompleted {
                duration_ms,
                total_gas_used,
                ..
            } => EventData::ExecutionCompleted {
                duration_ms: *duration_ms,
                total_gas_used: *total_gas_used,
            },
            ExecutionEvent::ExecutionFailed { error, node_id, .. } => EventData::ExecutionFailed {
                error,
                node_id: node_id.as_deref(),
            },
            ExecutionEvent::NodeStarted {
                node_id, node_type, ..
            } => EventData::NodeStarted { node_id, node_type },
            ExecutionEvent::NodeCompleted {
                node_id,
                node_type,
                outputs,
                duration_ms,
                gas_used,
                ..
            } => EventData::NodeCompleted {
                node_id,
                node_type,
                outputs,
                duration_ms: *duration_ms,
                gas_used: *gas_used,
            },
            ExecutionEvent::NodeFailed {
                node_id,
                node_type,
                error,
                duration_ms,
                ..
            } => EventData::NodeFailed {
                node_id,
                node_type,
                error,
                duration_ms: *duration_ms,
            },
        }
    }
}

impl Serialize for ExecutionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut envelope = serializer.serialize_struct("ExecutionEvent", 4)?;
        envelope.serialize_field("type", self.event_type())?;
        envelope.serialize_field("executionId", &self.execution_id())?;
        envelope.serialize_field("timestamp", &self.timestamp())?;
        envelope.serialize_field("data", &self.data())?;
        envelope.end()
    }
}

/// Single observable stream of lifecycle events for one engine
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}
