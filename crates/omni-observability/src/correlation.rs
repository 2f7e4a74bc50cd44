use std::cell::RefCell;
use std::future::Future;

use rand::Rng;

tokio::task_local! {
    static CORRELATION_STACK: RefCell<Vec<String>>;
}

/// Allocates a new correlation id in the `req-<random>` shape.
pub fn new_correlation_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("req-{suffix:016x}")
}

/// The correlation id logs and spans should inherit: the innermost pushed
/// id on the current task, or `None` outside of any
/// [`with_root_correlation`] scope.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_STACK.try_with(|stack| stack.borrow().last().cloned()).unwrap_or(None)
}

/// Establishes the task-local correlation stack for one inbound request,
/// seeded with `id` as the outermost entry. Every log record and span
/// created inside `fut` inherits `id` unless a nested [`CorrelationGuard`]
/// pushes a more specific one.
pub async fn with_root_correlation<F: Future>(id: impl Into<String>, fut: F) -> F::Output {
    CORRELATION_STACK.scope(RefCell::new(vec![id.into()]), fut).await
}

/// Pushes a correlation id onto the current task's stack for the guard's
/// lifetime, supporting nesting (e.g. an agent operation run under a
/// request's correlation id that wants its own sub-id). Popped on drop.
pub struct CorrelationGuard {
    active: bool,
}

impl CorrelationGuard {
    pub fn push(id: impl Into<String>) -> Self {
        let pushed = CORRELATION_STACK.try_with(|stack| stack.borrow_mut().push(id.into())).is_ok();
        Self { active: pushed }
    }
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = CORRELATION_STACK.try_with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_guard_shadows_then_restores_the_root_id() {
        with_root_correlation("req-root", async {
            assert_eq!(current_correlation_id().as_deref(), Some("req-root"));
            {
                let _inner = CorrelationGuard::push("req-nested");
                assert_eq!(current_correlation_id().as_deref(), Some("req-nested"));
            }
            assert_eq!(current_correlation_id().as_deref(), Some("req-root"));
        })
        .await;
    }

    #[tokio::test]
    async fn outside_any_scope_there_is_no_current_id() {
        assert_eq!(current_correlation_id(), None);
    }

    #[test]
    fn generated_ids_have_the_req_prefix() {
        assert!(new_correlation_id().starts_with("req-"));
    }
}
