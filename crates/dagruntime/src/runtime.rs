use crate::collector::NormalizationRules;
use crate::graph::ExecutionPlan;
use crate::loader::PluginLoader;
use crate::plugin::{ExecutorKind, KindRegistry, PluginDefinition, PluginExecutor};
use crate::registry::ExecutorRegistry;
use crate::scheduler::{Scheduler, SharedExecution};
use crate::store::ExecutionStore;
use chrono::Utc;
use dagcore::{
    EngineError, EventBus, Execution, ExecutionError, ExecutionEvent, ExecutionId,
    ExecutionStats, ExecutionStatus, Executor, NodeId, PartialContext, WorkflowDefinition,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Workflow execution engine: owns the executor registry, the execution
/// table and the event stream. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<ExecutorRegistry>,
    kinds: Arc<KindRegistry>,
    event_bus: Arc<EventBus>,
    store: ExecutionStore,
    config: Arc<EngineConfig>,
    shutdown: CancellationToken,
}

impl WorkflowEngine {
    /// Create a new engine with default settings
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a new engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_registry(Arc::new(ExecutorRegistry::new()), config)
    }

    /// Create a new engine with a pre-configured registry
    pub fn with_registry(registry: Arc<ExecutorRegistry>, config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            kinds: Arc::new(KindRegistry::new()),
            event_bus,
            store: ExecutionStore::new(),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn kinds(&self) -> &Arc<KindRegistry> {
        &self.kinds
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an executor; re-registering a type replaces the previous one
    pub fn register_executor(&self, node_type: impl Into<String>, executor: Arc<dyn Executor>) {
        self.registry.register(node_type, executor);
    }

    pub fn register_kind(&self, kind: Arc<dyn ExecutorKind>) {
        self.kinds.register(kind);
    }

    /// Build an executor from a declarative record and register it
    pub fn register_plugin(&self, plugin: PluginDefinition) -> Result<(), EngineError> {
        let kind = self
            .kinds
            .get(&plugin.kind)
            .ok_or_else(|| EngineError::UnknownKind {
                kind: plugin.kind.clone(),
                node_type: plugin.node_type.clone(),
            })?;

        let inner = kind.build(&plugin).map_err(|source| EngineError::Plugin {
            node_type: plugin.node_type.clone(),
            source,
        })?;

        tracing::debug!("Registering plugin {} (kind {})", plugin.node_type, plugin.kind);
        let executor = PluginExecutor::new(&plugin, inner);
        self.registry.register(plugin.node_type.clone(), Arc::new(executor));
        Ok(())
    }

    /// Register every plugin record found in `dir`; returns how many were registered
    pub fn load_plugins(&self, dir: impl AsRef<Path>) -> Result<usize, EngineError> {
        let definitions = PluginLoader::new(dir.as_ref()).load()?;
        let count = definitions.len();
        for definition in definitions {
            self.register_plugin(definition)?;
        }
        Ok(count)
    }

    /// Run a workflow to a terminal state.
    ///
    /// The execution record is stored before the graph is built, so it can be
    /// inspected with `get_execution` even when this returns an error.
    pub async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        context: PartialContext,
    ) -> Result<Execution, EngineError> {
        let execution = self.prepare(workflow, context).await;
        self.drive(&execution, workflow).await
    }

    /// Start a workflow in the background and return its id right away
    pub async fn start_workflow(
        &self,
        workflow: WorkflowDefinition,
        context: PartialContext,
    ) -> (ExecutionId, JoinHandle<Result<Execution, EngineError>>) {
        let execution = self.prepare(&workflow, context).await;
        let execution_id = execution.read().await.id;
        let engine = self.clone();

        let handle = tokio::spawn(async move { engine.drive(&execution, &workflow).await });
        (execution_id, handle)
    }

    async fn prepare(&self, workflow: &WorkflowDefinition, context: PartialContext) -> SharedExecution {
        let execution_id = Uuid::new_v4();
        let ctx = context.into_context(workflow.id.clone(), execution_id, &self.config.environment);
        self.store.insert(Execution::new(ctx)).await
    }

    async fn drive(
        &self,
        execution: &SharedExecution,
        workflow: &WorkflowDefinition,
    ) -> Result<Execution, EngineError> {
        {
            let mut exec = execution.write().await;
            match ExecutionPlan::build(&workflow.nodes, &workflow.edges) {
                Ok(plan) => {
                    let (steps, order) = plan.into_parts();
                    exec.steps = steps;
                    exec.order = order;
                }
                Err(source) => {
                    tracing::warn!("Workflow {} rejected: {}", workflow.id, source);
                    exec.error = Some(source.to_string());
                    exec.transition(ExecutionStatus::Failed)?;
                    self.event_bus.emit(ExecutionEvent::ExecutionFailed {
                        execution_id: exec.id,
                        error: source.to_string(),
                        node_id: Some(source.node_id().to_string()),
                        timestamp: Utc::now(),
                    });
                    return Err(EngineError::Graph {
                        execution_id: exec.id,
                        source,
                    });
                }
            }
        }

        let scheduler = Scheduler::new(&self.registry, &self.event_bus, &self.config.normalization);
        scheduler.run(execution).await?;

        let exec = execution.read().await;
        Ok(exec.clone())
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.store.snapshot(execution_id).await
    }

    /// Mark a running execution cancelled. In-flight steps still finish;
    /// no further rounds start. Returns false unless the execution was running.
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        let Some(execution) = self.store.get(execution_id).await else {
            return false;
        };

        let mut exec = execution.write().await;
        if exec.status != ExecutionStatus::Running {
            return false;
        }
        if let Err(e) = exec.transition(ExecutionStatus::Cancelled) {
            tracing::error!("{}", e);
            return false;
        }
        exec.error = Some("Cancelled by user".to_string());

        self.event_bus.emit(ExecutionEvent::ExecutionFailed {
            execution_id,
            error: "Cancelled by user".to_string(),
            node_id: None,
            timestamp: Utc::now(),
        });
        tracing::info!("Execution {} cancelled by user", execution_id);
        true
    }

    pub async fn get_execution_stats(&self, execution_id: ExecutionId) -> Option<ExecutionStats> {
        let execution = self.store.get(execution_id).await?;
        let exec = execution.read().await;
        Some(exec.stats())
    }

    /// Evict non-running executions older than `max_age`; returns how many were evicted
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        self.store.cleanup(max_age).await
    }

    /// Number of executions currently held in memory
    pub async fn execution_count(&self) -> usize {
        self.store.len().await
    }

    /// Subscribe to lifecycle events of every execution
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Sum executor gas estimates over the workflow's static node configs
    pub async fn estimate_gas(
        &self,
        workflow: &WorkflowDefinition,
        context: PartialContext,
    ) -> Result<GasEstimate, EngineError> {
        let execution_id = Uuid::new_v4();
        ExecutionPlan::build(&workflow.nodes, &workflow.edges)
            .map_err(|source| EngineError::Graph {
                execution_id,
                source,
            })?;
        let ctx = context.into_context(workflow.id.clone(), execution_id, &self.config.environment);

        let mut estimate = GasEstimate::default();
        for node in &workflow.nodes {
            let executor = self.registry.get(&node.node_type).ok_or_else(|| {
                ExecutionError::MissingExecutor {
                    execution_id,
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                }
            })?;

            let gas = executor
                .estimate_gas(&node.config, &ctx)
                .await
                .map_err(|source| ExecutionError::Fault {
                    execution_id,
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    source,
                })?;

            estimate.total += gas.unwrap_or(0);
            estimate.per_node.push((node.id.clone(), gas));
        }
        Ok(estimate)
    }

    /// Spawn the periodic eviction sweep. Returns `None` when the interval is zero.
    pub fn spawn_cleanup_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.cleanup_interval()?;
        let max_age = self.config.max_execution_age();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        store.cleanup(max_age).await;
                    }
                }
            }
            tracing::debug!("Cleanup task stopped");
        }))
    }

    /// Stop background tasks started by this engine
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Gas estimate for a whole workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasEstimate {
    pub per_node: Vec<(NodeId, Option<u64>)>,
    pub total: u64,
}

/// Configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub event_buffer_size: usize,
    pub max_execution_age_secs: u64,
    /// Zero disables the background sweep
    pub cleanup_interval_secs: u64,
    pub environment: String,
    pub normalization: NormalizationRules,
}

impl EngineConfig {
    pub fn max_execution_age(&self) -> Duration {
        Duration::from_secs(self.max_execution_age_secs)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            max_execution_age_secs: 3600,
            cleanup_interval_secs: 300,
            environment: "development".to_string(),
            normalization: NormalizationRules::default(),
        }
    }
}
