// crates/dagnodes/tests/nodes_test.rs

use dagcore::{
    EngineError, ExecutionStatus, NodeSpec, PartialContext, StepStatus, Value, WorkflowDefinition,
};
use dagnodes::{register_all, BundledKind};
use dagruntime::{EngineConfig, PluginDefinition, WorkflowEngine};
use std::fs;

fn engine() -> WorkflowEngine {
    let engine = WorkflowEngine::with_config(EngineConfig {
        cleanup_interval_secs: 0,
        environment: "staging".to_string(),
        ..EngineConfig::default()
    });
    register_all(&engine);
    engine
}

#[test]
fn builtins_and_kinds_are_registered() {
    let engine = engine();
    let types = engine.registry().list_node_types();
    for expected in ["debug.log", "echo", "http.request", "time.delay"] {
        assert!(types.contains(&expected.to_string()), "missing {expected}");
    }
    assert_eq!(
        engine.kinds().list_kinds(),
        vec!["bundled", "http", "mock", "script"]
    );
}

#[tokio::test]
async fn script_plugin_computes_outputs_from_inputs() {
    let engine = engine();
    engine
        .register_plugin(
            PluginDefinition::new("sum", "script")
                .with_config("script", "#{ total: inputs.a + inputs.b }")
                .with_required_input("a")
                .with_required_input("b"),
        )
        .unwrap();
    engine
        .register_plugin(
            PluginDefinition::new("where", "script").with_config("script", "context.environment"),
        )
        .unwrap();

    let mut wf = WorkflowDefinition::new("wf-script", "script");
    wf.add_node(NodeSpec::new("inputs", "echo").with_config("a", 2.0).with_config("b", 3.0));
    wf.add_node(NodeSpec::new("sum", "sum"));
    wf.add_node(NodeSpec::new("where", "where"));
    wf.connect("inputs", "sum");

    let execution = engine.execute_workflow(&wf, PartialContext::new()).await.unwrap();

    let sum = execution.step("sum").unwrap();
    assert_eq!(sum.outputs["total"], Value::Number(5.0));
    let env = execution.step("where").unwrap();
    assert_eq!(env.outputs["result"], Value::from("staging"));
}

#[tokio::test]
async fn script_runtime_errors_fail_the_step() {
    let engine = engine();
    engine
        .register_plugin(
            PluginDefinition::new("thrower", "script").with_config("script", r#"throw "bad input""#),
        )
        .unwrap();

    let mut wf = WorkflowDefinition::new("wf", "throw");
    wf.add_node(NodeSpec::new("t", "thrower"));

    let err = engine.execute_workflow(&wf, PartialContext::new()).await.unwrap_err();
    let execution = engine.get_execution(err.execution_id().unwrap()).await.unwrap();
    let step = execution.step("t").unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert!(step.error.as_deref().unwrap().contains("bad input"));
}

#[tokio::test]
async fn mock_chain_reports_gas_and_failures() {
    let engine = engine();
    engine
        .register_plugin(
            PluginDefinition::new("chain.approve", "mock")
                .with_config("gas_used", 46000i64)
                .with_config("delay_ms", 5i64),
        )
        .unwrap();
    engine
        .register_plugin(
            PluginDefinition::new("chain.swap", "mock").with_config("fail", "insufficient liquidity"),
        )
        .unwrap();

    let mut wf = WorkflowDefinition::new("wf-chain", "chain");
    wf.add_node(NodeSpec::new("approve", "chain.approve"));
    wf.add_node(NodeSpec::new("swap", "chain.swap"));
    wf.add_node(NodeSpec::new("notify", "debug.log").with_config("message", "done"));
    wf.connect("approve", "swap");
    wf.connect("swap", "notify");

    let estimate = engine.estimate_gas(&wf, PartialContext::new()).await.unwrap();
    assert_eq!(estimate.total, 46000);

    let err = engine.execute_workflow(&wf, PartialContext::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::Execution(_)));

    let stats = engine.get_execution_stats(err.execution_id().unwrap()).await.unwrap();
    assert_eq!(stats.status, ExecutionStatus::Failed);
    assert_eq!(stats.completed_steps, 1);
    assert_eq!(stats.failed_steps, 1);
    assert_eq!(stats.total_gas_used, 46000);

    let execution = engine.get_execution(err.execution_id().unwrap()).await.unwrap();
    assert_eq!(
        execution.step("swap").unwrap().error.as_deref(),
        Some("insufficient liquidity")
    );
    assert_eq!(execution.step("notify").unwrap().status, StepStatus::Pending);
}

#[tokio::test]
async fn bundled_records_alias_builtins() {
    let engine = engine();
    engine
        .register_plugin(PluginDefinition::new("relay", "bundled").with_config("executor", "echo"))
        .unwrap();

    let err = engine
        .register_plugin(PluginDefinition::new("nope", "bundled").with_config("executor", "teleport"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Plugin { .. }));
    assert!(BundledKind::new().names().contains(&"time.delay"));

    let mut wf = WorkflowDefinition::new("wf", "bundled");
    wf.add_node(NodeSpec::new("r", "relay").with_config("token", "ETH"));
    wf.add_node(NodeSpec::new("wait", "time.delay").with_config("delay_ms", 1i64));
    wf.connect("r", "wait");

    let execution = engine.execute_workflow(&wf, PartialContext::new()).await.unwrap();
    assert_eq!(execution.step("wait").unwrap().outputs["token"], Value::from("ETH"));
}

#[tokio::test]
async fn plugin_directory_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("double.json"),
        r#"{"node_type": "math.double", "kind": "script", "config": {"script": "inputs.n * 2.0"}}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("quote.json"),
        r#"{"node_type": "chain.quote", "kind": "mock", "config": {"outputs": {"price": 1800}}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "not a plugin").unwrap();

    let engine = engine();
    assert_eq!(engine.load_plugins(dir.path()).unwrap(), 2);

    let mut wf = WorkflowDefinition::new("wf", "loaded");
    wf.add_node(NodeSpec::new("d", "math.double").with_config("n", 21.0));
    wf.add_node(NodeSpec::new("q", "chain.quote"));

    let execution = engine.execute_workflow(&wf, PartialContext::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.step("d").unwrap().outputs["result"], Value::Number(42.0));
    assert_eq!(execution.step("q").unwrap().outputs["price"], Value::Integer(1800));
}
