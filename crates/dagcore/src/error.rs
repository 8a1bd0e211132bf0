use crate::{ExecutionId, ExecutionStatus, NodeId, StepStatus};
use thiserror::Error;

/// Top-level error returned by engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid workflow graph for execution {execution_id}: {source}")]
    Graph {
        execution_id: ExecutionId,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Execution {0} was cancelled")]
    Cancelled(ExecutionId),

    #[error("Invalid state transition: {0}")]
    State(#[from] InvalidTransition),

    #[error("Unknown executor kind '{kind}' for node type '{node_type}'")]
    UnknownKind { kind: String, node_type: String },

    #[error("Failed to build executor for node type '{node_type}': {source}")]
    Plugin {
        node_type: String,
        #[source]
        source: NodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// The execution this error belongs to, when there is one
    pub fn execution_id(&self) -> Option<ExecutionId> {
        match self {
            EngineError::Graph { execution_id, .. } => Some(*execution_id),
            EngineError::Execution(e) => Some(e.execution_id()),
            EngineError::Cancelled(id) => Some(*id),
            _ => None,
        }
    }
}

/// Structural problems found while building the dependency graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node id: {node_id}")]
    DuplicateNode { node_id: NodeId },

    #[error("Edge '{edge_id}' references unknown node: {node_id}")]
    DanglingDependency { node_id: NodeId, edge_id: String },

    #[error("Cyclic dependency detected at node: {node_id}")]
    Cycle { node_id: NodeId },
}

impl GraphError {
    pub fn node_id(&self) -> &str {
        match self {
            GraphError::DuplicateNode { node_id }
            | GraphError::DanglingDependency { node_id, .. }
            | GraphError::Cycle { node_id } => node_id,
        }
    }
}

/// Errors raised inside an executor
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}

/// Step-scoped and execution-scoped runtime failures
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("No executor registered for node type '{node_type}' (node '{node_id}')")]
    MissingExecutor {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
    },

    #[error("Validation failed for node '{node_id}' ({node_type}): {}", .errors.join("; "))]
    Validation {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        errors: Vec<String>,
    },

    #[error("Node '{node_id}' ({node_type}) failed: {message}")]
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        message: String,
    },

    #[error("Node '{node_id}' ({node_type}) raised an error: {source}")]
    Fault {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        #[source]
        source: NodeError,
    },

    #[error("Deadlock in execution {execution_id}: no runnable steps while {pending:?} remain")]
    Deadlock {
        execution_id: ExecutionId,
        pending: Vec<NodeId>,
    },

    #[error("Execution {execution_id} failed at step '{node_id}' ({node_type}): {message}")]
    StepFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        message: String,
    },
}

impl ExecutionError {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionError::MissingExecutor { execution_id, .. }
            | ExecutionError::Validation { execution_id, .. }
            | ExecutionError::NodeFailed { execution_id, .. }
            | ExecutionError::Fault { execution_id, .. }
            | ExecutionError::Deadlock { execution_id, .. }
            | ExecutionError::StepFailed { execution_id, .. } => *execution_id,
        }
    }

    /// Node the error is scoped to; `None` for deadlock
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionError::MissingExecutor { node_id, .. }
            | ExecutionError::Validation { node_id, .. }
            | ExecutionError::NodeFailed { node_id, .. }
            | ExecutionError::Fault { node_id, .. }
            | ExecutionError::StepFailed { node_id, .. } => Some(node_id),
            ExecutionError::Deadlock { .. } => None,
        }
    }

    pub fn node_type(&self) -> Option<&str> {
        match self {
            ExecutionError::MissingExecutor { node_type, .. }
            | ExecutionError::Validation { node_type, .. }
            | ExecutionError::NodeFailed { node_type, .. }
            | ExecutionError::Fault { node_type, .. }
            | ExecutionError::StepFailed { node_type, .. } => Some(node_type),
            ExecutionError::Deadlock { .. } => None,
        }
    }
}

/// A status change that would move a step or execution backwards
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidTransition {
    #[error("Step '{node_id}' cannot move from {from:?} to {to:?}")]
    Step {
        node_id: NodeId,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Execution cannot move from {from:?} to {to:?}")]
    Execution {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
}
