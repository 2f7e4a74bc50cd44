use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Version metadata attached to every `VersionedState` mutation.
#[derive(Debug, Clone)]
pub struct StateVersion {
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub last_modifier: Option<String>,
}

impl Default for StateVersion {
    fn default() -> Self {
        Self {
            version: 0,
            last_modified: Utc::now(),
            last_modifier: None,
        }
    }
}

impl StateVersion {
    fn increment(&self, modifier: Option<&str>) -> Self {
        Self {
            version: self.version + 1,
            last_modified: Utc::now(),
            last_modifier: modifier.map(ToString::to_string),
        }
    }
}

type ChangeCallback<T> = Box<dyn Fn(&T, &StateVersion) + Send + Sync>;

/// A single piece of mutable state shared across agents: locked access,
/// monotonic version tracking, and optimistic `update_if_version`.
pub struct VersionedState<T> {
    name: String,
    value: RwLock<T>,
    version: RwLock<StateVersion>,
    on_change: RwLock<Vec<ChangeCallback<T>>>,
}

impl<T> VersionedState<T> {
    pub fn new(initial_value: T, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(initial_value),
            version: RwLock::new(StateVersion::default()),
            on_change: RwLock::new(Vec::new()),
        }
    }

    pub fn version(&self) -> StateVersion {
        self.version.read().clone()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    pub fn set(&self, new_value: T, modifier: Option<&str>) {
        let mut value = self.value.write();
        *value = new_value;
        let next_version = self.version.read().increment(modifier);
        *self.version.write() = next_version.clone();
        self.notify_change(&value, &next_version);
    }

    pub fn update(&self, f: impl FnOnce(&mut T), modifier: Option<&str>) {
        let mut value = self.value.write();
        f(&mut value);
        let next_version = self.version.read().increment(modifier);
        *self.version.write() = next_version.clone();
        self.notify_change(&value, &next_version);
    }

    /// Applies `f` only if `expected_version` matches the current version
    /// (optimistic concurrency). Returns `false` on mismatch without
    /// touching the value.
    pub fn update_if_version(
        &self,
        expected_version: u64,
        f: impl FnOnce(&mut T),
        modifier: Option<&str>,
    ) -> bool {
        let mut value = self.value.write();
        let current = self.version.read().clone();
        if current.version != expected_version {
            tracing::warn!(
                state = %self.name,
                expected = expected_version,
                actual = current.version,
                "version mismatch"
            );
            return false;
        }
        f(&mut value);
        let next_version = current.increment(modifier);
        *self.version.write() = next_version.clone();
        self.notify_change(&value, &next_version);
        true
    }

    pub fn on_change(&self, callback: impl Fn(&T, &StateVersion) + Send + Sync + 'static) {
        self.on_change.write().push(Box::new(callback));
    }

    fn notify_change(&self, value: &T, version: &StateVersion) {
        for callback in self.on_change.read().iter() {
            callback(value, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_if_version_rejects_stale_caller() {
        let state = VersionedState::new(0i32, "counter");
        assert!(state.update_if_version(0, |v| *v += 1, Some("a")));
        assert_eq!(state.get(), 1);
        // Stale caller still thinks version is 0.
        assert!(!state.update_if_version(0, |v| *v += 100, Some("b")));
        assert_eq!(state.get(), 1);
        assert_eq!(state.version().version, 1);
    }

    #[test]
    fn on_change_fires_with_new_value_and_version() {
        use std::sync::atomic::{AtomicI32, Ordering};
        use std::sync::Arc;

        let state = VersionedState::new(0i32, "counter");
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        state.on_change(move |value, _version| {
            seen_clone.store(*value, Ordering::SeqCst);
        });

        state.set(42, Some("tester"));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
