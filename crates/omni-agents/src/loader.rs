use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use omni_errors::{ErrorKind, OmniError};
use omni_types::AgentMetadata;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::fs;

use crate::contract::Agent;
use crate::registry::AgentRegistry;

/// On-disk manifest for a dynamically-registered agent. Rust has no
/// runtime reflection to scan for base-class subclasses, so discovery is
/// manifest-driven: a JSON file names a `constructor` that must already be
/// registered in the loader's built-in table.
#[derive(Debug, Clone, Deserialize)]
struct AgentManifest {
    constructor: String,
    #[serde(flatten)]
    metadata: AgentMetadata,
}

/// Discovers and registers agents from (a) a built-in constructor table,
/// (b) manifest files in configured plugin directories, and (c) named
/// constructors looked up directly. Files whose name starts with `_` are
/// skipped, matching the source loader's convention for private modules.
#[derive(Clone, Default)]
pub struct PluginLoader {
    constructors: Arc<RwLock<HashMap<String, Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>>>>,
    tracked_files: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named constructor ("module") that manifests and
    /// `load_module` can reference.
    pub fn register_constructor(
        &self,
        name: impl Into<String>,
        constructor: impl Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    ) {
        self.constructors.write().insert(name.into(), Arc::new(constructor));
    }

    /// Registers `name`'s constructor directly into `registry` under
    /// `metadata`.
    pub fn load_module(
        &self,
        name: &str,
        metadata: AgentMetadata,
        registry: &AgentRegistry,
    ) -> Result<(), OmniError> {
        let constructor = self
            .constructors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                OmniError::new(ErrorKind::AgentNotFound, format!("no constructor registered for module '{name}'"))
            })?;
        match registry.register(metadata, move || constructor()) {
            Ok(()) => Ok(()),
            // Duplicates are silently dropped, per the loader contract.
            Err(err) if err.kind == ErrorKind::AgentConfiguration => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Scans `dir` for `*.agent.json` manifests, skipping any file whose
    /// name starts with `_`, and registers each against its named
    /// constructor. Returns the number of agents registered.
    pub async fn load_dir(&self, dir: &Path, registry: &AgentRegistry) -> Result<usize, OmniError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(OmniError::new(ErrorKind::AgentConfiguration, err.to_string()))
            }
        };

        let mut registered = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OmniError::new(ErrorKind::AgentConfiguration, e.to_string()))?
        {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('_') || !file_name.ends_with(".agent.json") {
                continue;
            }
            if self.load_manifest(&path, registry).await? {
                registered += 1;
            }
        }
        Ok(registered)
    }

    async fn load_manifest(&self, path: &Path, registry: &AgentRegistry) -> Result<bool, OmniError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| OmniError::new(ErrorKind::AgentConfiguration, e.to_string()))?;
        let manifest: AgentManifest = serde_json::from_str(&raw)
            .map_err(|e| OmniError::new(ErrorKind::AgentConfiguration, e.to_string()))?;

        let constructor = self
            .constructors
            .read()
            .get(&manifest.constructor)
            .cloned()
            .ok_or_else(|| {
                OmniError::new(
                    ErrorKind::AgentConfiguration,
                    format!("manifest '{}' names unknown constructor '{}'", path.display(), manifest.constructor),
                )
            })?;

        let id = manifest.metadata.id.clone();
        match registry.register(manifest.metadata, move || constructor()) {
            Ok(()) => {
                self.tracked_files.write().insert(id, path.to_path_buf());
                Ok(true)
            }
            Err(err) if err.kind == ErrorKind::AgentConfiguration => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Unregisters `id`, forgets its tracked manifest path, then
    /// re-registers it from the same file.
    pub async fn reload(&self, id: &str, registry: &AgentRegistry) -> Result<(), OmniError> {
        let path = self.tracked_files.write().remove(id).ok_or_else(|| {
            OmniError::new(ErrorKind::AgentNotFound, format!("no tracked manifest for agent '{id}'"))
        })?;
        registry.unregister(id);
        self.load_manifest(&path, registry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::StatusCell;
    use omni_types::{AgentMessage, AgentMessageKind, AgentStatus};

    struct Dummy {
        metadata: AgentMetadata,
        status: StatusCell,
    }

    #[async_trait::async_trait]
    impl Agent for Dummy {
        fn metadata(&self) -> &AgentMetadata {
            &self.metadata
        }

        fn status(&self) -> AgentStatus {
            self.status.get()
        }

        async fn process(
            &self,
            message: AgentMessage,
            _context: &omni_context::SharedContext,
        ) -> omni_errors::Result<AgentMessage> {
            Ok(AgentMessage::new(AgentMessageKind::Text, "dummy", message.content))
        }
    }

    fn meta(id: &str) -> AgentMetadata {
        AgentMetadata {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "0.1.0".to_string(),
            capabilities: vec![],
            dependencies: vec![],
            provides: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn loads_manifest_from_directory_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(
            dir.join("custom.agent.json"),
            serde_json::to_string(&serde_json::json!({
                "constructor": "dummy",
                "id": "custom",
                "name": "Custom",
                "description": "",
                "version": "0.1.0",
                "capabilities": [],
                "dependencies": [],
                "provides": [],
                "tags": [],
            }))
            .unwrap(),
        )
        .await
        .unwrap();
        fs::write(dir.join("_private.agent.json"), "{}").await.unwrap();

        let loader = PluginLoader::new();
        loader.register_constructor("dummy", || {
            Arc::new(Dummy {
                metadata: meta("custom"),
                status: StatusCell::new(),
            }) as Arc<dyn Agent>
        });
        let registry = AgentRegistry::new();
        let registered = loader.load_dir(dir, &registry).await.unwrap();
        assert_eq!(registered, 1);
        assert!(registry.get("custom").is_some());

        loader.reload("custom", &registry).await.unwrap();
        assert!(registry.get("custom").is_some());
    }
}
