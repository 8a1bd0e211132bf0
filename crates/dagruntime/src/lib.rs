//! Workflow execution runtime
//! 
//! This crate provides the engine that runs workflows: the executor
//! registry and executor kinds, the dependency graph builder, input
//! collection, the round-based scheduler and the in-memory execution table.

mod collector;
mod graph;
mod loader;
mod plugin;
mod registry;
mod runtime;
mod scheduler;
mod store;

pub use collector::{collect_inputs, AliasRule, NormalizationRules};
pub use graph::{build_steps, ExecutionPlan};
pub use loader::PluginLoader;
pub use plugin::{ExecutorKind, KindRegistry, PluginDefinition, PluginExecutor};
pub use registry::ExecutorRegistry;
pub use runtime::{EngineConfig, GasEstimate, WorkflowEngine};
pub use scheduler::{plan_round, Frontier, Scheduler, SharedExecution};
pub use store::ExecutionStore;
