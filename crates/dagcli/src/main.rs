// crates/dagcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dagcore::{
    json_to_map, Execution, ExecutionEvent, NodeSpec, PartialContext, StepStatus,
    WorkflowDefinition,
};
use dagruntime::{EngineConfig, ExecutionPlan, WorkflowEngine};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dagflow")]
#[command(about = "DAG workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Context variables as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Environment name passed to executors
        #[arg(short, long)]
        environment: Option<String>,

        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of plugin records (*.json) to register
        #[arg(short, long)]
        plugins: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Directory of plugin records (*.json) to register
        #[arg(short, long)]
        plugins: Option<PathBuf>,
    },

    /// List available node types and executor kinds
    Nodes {
        /// Directory of plugin records (*.json) to register
        #[arg(short, long)]
        plugins: Option<PathBuf>,
    },

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            environment,
            config,
            plugins,
            verbose,
        } => {
            init_logging(verbose);
            let config = load_config(config.as_deref())?;
            let engine = build_engine(config, plugins.as_deref())?;
            run_workflow(&engine, &file, input, environment).await?;
        }

        Commands::Validate { file, plugins } => {
            init_logging(false);
            let engine = build_engine(EngineConfig::default(), plugins.as_deref())?;
            validate_workflow(&engine, &file)?;
        }

        Commands::Nodes { plugins } => {
            init_logging(false);
            let engine = build_engine(EngineConfig::default(), plugins.as_deref())?;
            list_nodes(&engine);
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn build_engine(mut config: EngineConfig, plugins: Option<&Path>) -> Result<WorkflowEngine> {
    // One-shot runs never need the background sweep
    config.cleanup_interval_secs = 0;
    let engine = WorkflowEngine::with_config(config);
    dagnodes::register_all(&engine);

    if let Some(dir) = plugins {
        let count = engine
            .load_plugins(dir)
            .with_context(|| format!("loading plugins from {}", dir.display()))?;
        tracing::info!("Registered {} plugins from {}", count, dir.display());
    }
    Ok(engine)
}

fn load_workflow(file: &Path) -> Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing workflow {}", file.display()))
}

async fn run_workflow(
    engine: &WorkflowEngine,
    file: &Path,
    input: Option<String>,
    environment: Option<String>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let workflow = load_workflow(file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let mut context = PartialContext::new();
    if let Some(input) = input {
        let json: serde_json::Value = serde_json::from_str(&input).context("parsing --input")?;
        let Some(variables) = json_to_map(json) else {
            bail!("Input must be a JSON object");
        };
        for (name, value) in variables {
            context = context.with_variable(name, value);
        }
    }
    if let Some(environment) = environment {
        context = context.with_environment(environment);
    }

    // Subscribe to events for real-time output
    let event_task = tokio::spawn(print_events(engine.subscribe()));

    let outcome = engine.execute_workflow(&workflow, context).await;

    // Wait for events to finish printing
    let _ = tokio::time::timeout(Duration::from_millis(500), event_task).await;

    match outcome {
        Ok(execution) => {
            print_summary(&execution);
            Ok(())
        }
        Err(err) => {
            if let Some(execution) = match err.execution_id() {
                Some(id) => engine.get_execution(id).await,
                None => None,
            } {
                print_summary(&execution);
            }
            Err(err.into())
        }
    }
}

/// Print events until the execution finishes or the bus closes.
/// Returns how many events were printed.
async fn print_events(mut events: Receiver<ExecutionEvent>) -> usize {
    let mut printed = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                printed += 1;
                if print_event(&event) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event output fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    printed
}

/// Print one event; returns true once the execution has finished
fn print_event(event: &ExecutionEvent) -> bool {
    match event {
        ExecutionEvent::ExecutionStarted { total_steps, .. } => {
            println!("▶️  Execution started ({} steps)", total_steps);
        }
        ExecutionEvent::NodeStarted {
            node_id, node_type, ..
        } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            duration_ms,
            gas_used,
            ..
        } => match gas_used {
            Some(gas) => println!("  ✅ Node {} completed in {}ms (gas {})", node_id, duration_ms, gas),
            None => println!("  ✅ Node {} completed in {}ms", node_id, duration_ms),
        },
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::ExecutionCompleted {
            duration_ms,
            total_gas_used,
            ..
        } => {
            println!(
                "✨ Execution completed successfully in {}ms (gas {})",
                duration_ms, total_gas_used
            );
            return true;
        }
        ExecutionEvent::ExecutionFailed { error, .. } => {
            println!("💥 Execution failed: {}", error);
            return true;
        }
    }
    false
}

fn print_summary(execution: &Execution) {
    let stats = execution.stats();

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", execution.id);
    println!("   Status: {:?}", stats.status);
    println!(
        "   Completed: {}/{} steps ({} failed)",
        stats.completed_steps, stats.total_steps, stats.failed_steps
    );
    if stats.total_gas_used > 0 {
        println!("   Gas used: {}", stats.total_gas_used);
    }

    let blocked: Vec<&str> = execution
        .ordered_steps()
        .filter(|s| s.status == StepStatus::Pending)
        .map(|s| s.node_id.as_str())
        .collect();
    if !blocked.is_empty() {
        println!("   Not run: {}", blocked.join(", "));
    }

    let with_outputs: Vec<_> = execution
        .ordered_steps()
        .filter(|s| !s.outputs.is_empty())
        .collect();
    if !with_outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for step in with_outputs {
            println!("   Node {}:", step.node_id);
            let mut keys: Vec<&String> = step.outputs.keys().collect();
            keys.sort();
            for key in keys {
                println!("     {}: {}", key, step.outputs[key].to_json());
            }
        }
    }
}

fn validate_workflow(engine: &WorkflowEngine, file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());
    let workflow = load_workflow(file)?;

    let plan = ExecutionPlan::build(&workflow.nodes, &workflow.edges)
        .with_context(|| format!("workflow '{}' has an invalid graph", workflow.id))?;

    let unknown: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|node| !engine.registry().contains(&node.node_type))
        .map(|node| format!("{} ({})", node.id, node.node_type))
        .collect();
    if !unknown.is_empty() {
        bail!("no executor registered for: {}", unknown.join(", "));
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();
    for line in render_plan(&plan) {
        println!("{}", line);
    }

    Ok(())
}

/// Scheduling rounds followed by each node's direct dependents
fn render_plan(plan: &ExecutionPlan) -> Vec<String> {
    let mut lines = vec!["🧭 Execution rounds:".to_string()];
    for (level, ids) in plan.levels().iter().enumerate() {
        lines.push(format!("   {}: {}", level + 1, ids.join(", ")));
    }

    let fan_out: Vec<String> = plan
        .order()
        .iter()
        .filter_map(|id| {
            let dependents = plan.dependents(id);
            (!dependents.is_empty()).then(|| format!("   {} → {}", id, dependents.join(", ")))
        })
        .collect();
    if !fan_out.is_empty() {
        lines.push(String::new());
        lines.push("🔀 Feeds:".to_string());
        lines.extend(fan_out);
    }
    lines
}

fn list_nodes(engine: &WorkflowEngine) {
    println!("📦 Available Node Types:");
    println!();

    let registry = engine.registry();
    for node_type in registry.list_node_types() {
        match registry.get_metadata(&node_type) {
            Some(metadata) if !metadata.description.is_empty() => {
                println!("  • {} ({})", node_type, metadata.category);
                println!("    {}", metadata.description);
            }
            Some(metadata) => println!("  • {} ({})", node_type, metadata.category),
            None => println!("  • {}", node_type),
        }
    }

    println!();
    println!("🧩 Executor kinds: {}", engine.kinds().list_kinds().join(", "));
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut workflow = WorkflowDefinition::new("example-http", "Example HTTP Workflow");
    workflow.description = Some("Fetches data from an API and logs the result".to_string());

    let fetch = workflow.add_node(
        NodeSpec::new("fetch", "http.request")
            .with_config("method", "GET")
            .with_config("url", "https://api.github.com/zen"),
    );
    let log = workflow.add_node(NodeSpec::new("log", "debug.log").with_config("message", "fetched"));
    workflow.connect(fetch, log);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  dagflow run --file {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dagcore::ExecutionId;
    use tokio::sync::broadcast;

    fn started(node_id: &str) -> ExecutionEvent {
        ExecutionEvent::NodeStarted {
            execution_id: ExecutionId::nil(),
            node_id: node_id.into(),
            node_type: "echo".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn printing_survives_a_lagging_receiver() {
        let (tx, rx) = broadcast::channel(2);
        for id in ["a", "b", "c", "d"] {
            tx.send(started(id)).unwrap();
        }
        tx.send(ExecutionEvent::ExecutionCompleted {
            execution_id: ExecutionId::nil(),
            duration_ms: 3,
            total_gas_used: 0,
            timestamp: Utc::now(),
        })
        .unwrap();

        // Only the newest two are retained; the completion is still seen
        assert_eq!(print_events(rx).await, 2);
    }

    #[tokio::test]
    async fn printing_stops_when_the_bus_closes() {
        let (tx, rx) = broadcast::channel(4);
        tx.send(started("a")).unwrap();
        drop(tx);

        assert_eq!(print_events(rx).await, 1);
    }

    #[test]
    fn plan_lists_rounds_and_fan_out() {
        let mut workflow = WorkflowDefinition::new("wf", "diamond");
        for id in ["a", "b", "c", "d"] {
            workflow.add_node(NodeSpec::new(id, "echo"));
        }
        workflow.connect("a", "b");
        workflow.connect("a", "c");
        workflow.connect("b", "d");
        workflow.connect("c", "d");
        let plan = ExecutionPlan::build(&workflow.nodes, &workflow.edges).unwrap();

        assert_eq!(
            render_plan(&plan),
            vec![
                "🧭 Execution rounds:",
                "   1: a",
                "   2: b, c",
                "   3: d",
                "",
                "🔀 Feeds:",
                "   a → b, c",
                "   b → d",
                "   c → d",
            ]
        );
    }
}
