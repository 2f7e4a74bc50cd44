use std::collections::HashMap;
use std::sync::Arc;

use omni_errors::{ErrorContext, ErrorKind, OmniError};
use omni_types::{AgentCapability, AgentMetadata};
use parking_lot::RwLock;

use crate::contract::Agent;

pub type AgentFactory = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

struct Entry {
    metadata: AgentMetadata,
    factory: AgentFactory,
    enabled: bool,
}

/// In-process agent registry: holds `{id -> (factory, metadata, enabled)}`.
/// `get` always returns a fresh instance so the orchestrator's agent map
/// owns distinct, independently-stateful instances per registration.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `metadata`/`factory` under `metadata.id`. Rejects a
    /// duplicate id with a non-recoverable `AgentConfiguration` error.
    pub fn register(
        &self,
        metadata: AgentMetadata,
        factory: impl Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    ) -> Result<(), OmniError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&metadata.id) {
            return Err(OmniError::new(
                ErrorKind::AgentConfiguration,
                format!("agent '{}' is already registered", metadata.id),
            )
            .with_context(ErrorContext::new().agent(metadata.id.clone()).operation("register")));
        }
        entries.insert(
            metadata.id.clone(),
            Entry {
                metadata,
                factory: Arc::new(factory),
                enabled: true,
            },
        );
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn enable(&self, id: &str) -> bool {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.enabled = true;
            true
        } else {
            false
        }
    }

    pub fn disable(&self, id: &str) -> bool {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.enabled = false;
            true
        } else {
            false
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries.read().get(id).map(|e| e.enabled).unwrap_or(false)
    }

    /// Returns a freshly constructed instance iff the agent is registered
    /// and enabled.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        let entries = self.entries.read();
        let entry = entries.get(id)?;
        if !entry.enabled {
            return None;
        }
        Some((entry.factory)())
    }

    pub fn metadata(&self, id: &str) -> Option<AgentMetadata> {
        self.entries.read().get(id).map(|e| e.metadata.clone())
    }

    pub fn find_by_capability(&self, capability: AgentCapability) -> Vec<AgentMetadata> {
        self.entries
            .read()
            .values()
            .filter(|e| e.enabled && e.metadata.has_capability(capability))
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<AgentMetadata> {
        self.entries
            .read()
            .values()
            .filter(|e| e.enabled && e.metadata.tags.iter().any(|t| t == tag))
            .map(|e| e.metadata.clone())
            .collect()
    }

    /// Lists registered agent metadata, optionally filtered to enabled
    /// ones only.
    pub fn list(&self, enabled_only: bool) -> Vec<AgentMetadata> {
        self.entries
            .read()
            .values()
            .filter(|e| !enabled_only || e.enabled)
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn all_metadata(&self) -> Vec<AgentMetadata> {
        self.list(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_types::{AgentMessage, AgentMessageKind, AgentStatus};
    use crate::contract::StatusCell;

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

    fn dummy_meta(id: &str) -> AgentMetadata {
        AgentMetadata {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "0.1.0".to_string(),
            capabilities: vec![],
            dependencies: vec![],
            provides: vec![],
            tags: vec!["test".to_string()],
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = AgentRegistry::new();
        let meta = dummy_meta("dummy");
        registry
            .register(meta.clone(), || {
                Arc::new(Dummy {
                    metadata: dummy_meta("dummy"),
                    status: StatusCell::new(),
                }) as Arc<dyn Agent>
            })
            .unwrap();
        let err = registry
            .register(meta, || {
                Arc::new(Dummy {
                    metadata: dummy_meta("dummy"),
                    status: StatusCell::new(),
                }) as Arc<dyn Agent>
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentConfiguration);
    }

    #[test]
    fn disabled_agent_is_not_returned() {
        let registry = AgentRegistry::new();
        registry
            .register(dummy_meta("dummy"), || {
                Arc::new(Dummy {
                    metadata: dummy_meta("dummy"),
                    status: StatusCell::new(),
                }) as Arc<dyn Agent>
            })
            .unwrap();
        assert!(registry.get("dummy").is_some());
        registry.disable("dummy");
        assert!(registry.get("dummy").is_none());
    }

    #[test]
    fn find_by_tag_filters_enabled_only() {
        let registry = AgentRegistry::new();
        registry
            .register(dummy_meta("dummy"), || {
                Arc::new(Dummy {
                    metadata: dummy_meta("dummy"),
                    status: StatusCell::new(),
                }) as Arc<dyn Agent>
            })
            .unwrap();
        assert_eq!(registry.find_by_tag("test").len(), 1);
        registry.disable("dummy");
        assert_eq!(registry.find_by_tag("test").len(), 0);
    }
}
