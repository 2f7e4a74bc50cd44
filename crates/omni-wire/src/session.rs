use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Per-connection session state: `{sessionId, currentAgentId, context}`.
/// `context` itself lives in the shared [`omni_context::SharedContext`]
/// owned by the orchestrator — a session only tracks which agent is
/// currently selected and whether it has been asked to cancel.
pub struct Session {
    pub id: String,
    current_agent_id: RwLock<Option<String>>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            current_agent_id: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn current_agent_id(&self) -> Option<String> {
        self.current_agent_id.read().clone()
    }

    pub fn select_agent(&self, agent_id: impl Into<String>) {
        *self.current_agent_id.write() = Some(agent_id.into());
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels in-flight operations for this session at their next
    /// suspension point (the next `.await` that observes the token).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Sessions live for the lifetime of one connection. One registry per wire
/// handler; removing a session drops its cancellation token, which is
/// sufficient to abort any operation still awaiting on it.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<std::collections::HashMap<String, std::sync::Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &str) -> std::sync::Arc<Session> {
        if let Some(session) = self.sessions.read().get(id) {
            return session.clone();
        }
        let session = std::sync::Arc::new(Session::new(id));
        self.sessions.write().insert(id.to_string(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<std::sync::Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Removes the session, cancelling any operation still holding its
    /// token. Called on transport close; other sessions are unaffected.
    pub fn remove(&self, id: &str) -> bool {
        if let Some(session) = self.sessions.write().remove(id) {
            session.cancel();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_cancels_only_the_removed_session() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");

        registry.remove("a");
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn get_or_create_returns_the_same_session_twice() {
        let registry = SessionRegistry::new();
        let first = registry.get_or_create("s");
        first.select_agent("context");
        let second = registry.get_or_create("s");
        assert_eq!(second.current_agent_id().as_deref(), Some("context"));
    }
}
