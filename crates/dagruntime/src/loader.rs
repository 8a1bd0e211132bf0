// crates/dagruntime/src/loader.rs
use crate::plugin::PluginDefinition;
use dagcore::EngineError;
use std::path::{Path, PathBuf};

/// Reads plugin records (`*.json`) from a directory
pub struct PluginLoader {
    watch_dir: PathBuf,
}

impl PluginLoader {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Load every definition, sorted by file name so registration order is stable
    pub fn load(&self) -> Result<Vec<PluginDefinition>, EngineError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.watch_dir)? {
            let path = entry?.path();
            if path.extension() == Some("json".as_ref()) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let definition: PluginDefinition =
                serde_json::from_reader(std::fs::File::open(&path)?)?;
            tracing::debug!(
                "Loaded plugin '{}' ({}) from {}",
                definition.node_type,
                definition.kind,
                path.display()
            );
            definitions.push(definition);
        }
        Ok(definitions)
    }
}
