use super::{context_json, map_to_json};
use async_trait::async_trait;
use dagcore::{json_to_map, ExecutionContext, Executor, NodeError, NodeExecutionResult, Value, ValueMap};
use dagruntime::{ExecutorKind, PluginDefinition};
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::Arc;

const DEFAULT_MAX_OPERATIONS: u64 = 100_000;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 64 * 1024;
const MAX_COLLECTION_SIZE: usize = 10_000;

/// Builds executors whose body is a Rhai script.
///
/// The script runs in a sandboxed engine with bounded operations, call depth
/// and collection sizes. It sees two variables:
/// - `inputs`: the merged step inputs as an object map
/// - `context`: execution id, workflow id, environment, user id and variables
///
/// A map result becomes the step outputs; any other value is stored under
/// `result`. A unit result yields empty outputs.
pub struct ScriptKind;

impl ScriptKind {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScriptKind {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorKind for ScriptKind {
    fn kind(&self) -> &str {
        "script"
    }

    fn build(&self, plugin: &PluginDefinition) -> Result<Arc<dyn Executor>, NodeError> {
        let source = plugin.require_str("script")?;
        let max_operations = plugin
            .config
            .get("max_operations")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_OPERATIONS);

        let engine = sandboxed_engine(max_operations);
        let ast = engine.compile(source).map_err(|e| {
            NodeError::Configuration(format!("Script for '{}' does not compile: {}", plugin.node_type, e))
        })?;

        Ok(Arc::new(ScriptExecutor {
            name: format!("{} (script)", plugin.node_type),
            engine: Arc::new(engine),
            ast: Arc::new(ast),
        }))
    }
}

fn sandboxed_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(max_operations);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
    engine.set_max_call_levels(MAX_EXPR_DEPTH);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_COLLECTION_SIZE);
    engine.set_max_map_size(MAX_COLLECTION_SIZE);
    engine
}

pub struct ScriptExecutor {
    name: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

#[async_trait]
impl Executor for ScriptExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        inputs: &ValueMap,
        ctx: &ExecutionContext,
    ) -> Result<NodeExecutionResult, NodeError> {
        let inputs_json = map_to_json(inputs);
        let context = context_json(ctx).await;
        let engine = self.engine.clone();
        let ast = self.ast.clone();

        // Script evaluation is CPU-bound
        let output = tokio::task::spawn_blocking(move || -> Result<serde_json::Value, String> {
            let mut scope = Scope::new();
            scope.push_dynamic("inputs", to_dynamic(&inputs_json)?);
            scope.push_dynamic("context", to_dynamic(&context)?);

            let result: Dynamic = engine
                .eval_ast_with_scope(&mut scope, &ast)
                .map_err(|e| e.to_string())?;
            if result.is_unit() {
                return Ok(serde_json::Value::Null);
            }
            rhai::serde::from_dynamic(&result).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| NodeError::ExecutionFailed(format!("Script task failed: {}", e)))?
        .map_err(|e| NodeError::ExecutionFailed(format!("Script error: {}", e)))?;

        let outputs = match output {
            serde_json::Value::Null => ValueMap::new(),
            other @ serde_json::Value::Object(_) => json_to_map(other).unwrap_or_default(),
            other => {
                let mut outputs = ValueMap::new();
                outputs.insert("result".to_string(), Value::from(other));
                outputs
            }
        };
        Ok(NodeExecutionResult::success(outputs))
    }
}

fn to_dynamic(value: &serde_json::Value) -> Result<Dynamic, String> {
    rhai::serde::to_dynamic(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn build(script: &str) -> Result<Arc<dyn Executor>, NodeError> {
        ScriptKind::new().build(&PluginDefinition::new("calc", "script").with_config("script", script))
    }

    #[test]
    fn compile_errors_surface_at_build_time() {
        let err = build("let x = ;").err().unwrap();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[test]
    fn missing_script_is_a_configuration_error() {
        let err = ScriptKind::new()
            .build(&PluginDefinition::new("calc", "script"))
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[tokio::test]
    async fn runaway_scripts_hit_the_operation_limit() {
        let exec = ScriptKind::new()
            .build(
                &PluginDefinition::new("spin", "script")
                    .with_config("script", "loop { }")
                    .with_config("max_operations", 1000i64),
            )
            .unwrap();
        let ctx = ExecutionContext::new("wf", Uuid::new_v4(), "test");

        let err = exec.execute(&ValueMap::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::ExecutionFailed(_)));
    }
}
