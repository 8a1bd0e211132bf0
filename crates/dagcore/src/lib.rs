//! Core abstractions for the workflow execution engine
//! 
//! This crate provides the data model (workflow definitions, steps,
//! executions, values), the `Executor` capability every node type
//! implements, the lifecycle event stream and the error taxonomy.

mod context;
mod error;
pub mod events;
mod execution;
mod executor;
mod step;
mod value;
mod workflow;

pub use context::{ExecutionContext, PartialContext};
pub use error::{EngineError, ExecutionError, GraphError, InvalidTransition, NodeError};
pub use execution::{Execution, ExecutionStats, ExecutionStatus};
pub use executor::{
    validate_required, Executor, ExecutorMetadata, NodeExecutionResult, ValidationResponse,
    ValidationResult,
};
pub use step::{Step, StepStatus};
pub use value::{json_to_map, Value, ValueMap};
pub use workflow::{Edge, NodeId, NodeSpec, WorkflowDefinition, WorkflowId};
pub use events::*;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
