//! Standard node library
//!
//! Built-in executors for common operations, plus the executor kinds that
//! turn declarative plugin records into executors.

mod debug;
mod echo;
mod http;
pub mod kinds;
mod time;

pub use debug::DebugExecutor;
pub use echo::EchoExecutor;
pub use http::HttpRequestExecutor;
pub use kinds::{BundledKind, HttpKind, MockChainKind, ScriptKind};
pub use time::DelayExecutor;

use dagcore::Executor;
use dagruntime::WorkflowEngine;
use std::sync::Arc;

/// Every built-in executor keyed by the node type it registers under
pub fn builtin_executors() -> Vec<(&'static str, Arc<dyn Executor>)> {
    vec![
        ("echo", Arc::new(EchoExecutor) as Arc<dyn Executor>),
        ("debug.log", Arc::new(DebugExecutor)),
        ("time.delay", Arc::new(DelayExecutor)),
        ("http.request", Arc::new(HttpRequestExecutor::new())),
    ]
}

/// Register all built-in executors and executor kinds with an engine
pub fn register_all(engine: &WorkflowEngine) {
    for (node_type, executor) in builtin_executors() {
        engine.register_executor(node_type, executor);
    }

    engine.register_kind(Arc::new(ScriptKind::new()));
    engine.register_kind(Arc::new(HttpKind::new()));
    engine.register_kind(Arc::new(MockChainKind));
    engine.register_kind(Arc::new(BundledKind::new()));
}
