use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::OmniError;

/// `{maxRetries, baseDelay, maxDelay, exponentialBase, jitter}`.
/// `retryableKinds` is represented implicitly: an attempt retries when
/// either the error's kind is retryable by default or its `recoverable`
/// flag is set, matching `should_retry` below.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl RetryConfig {
    pub const fn new(max_retries: u32, base_delay_secs: f64, max_delay_secs: f64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis((base_delay_secs * 1000.0) as u64),
            max_delay: Duration::from_millis((max_delay_secs * 1000.0) as u64),
            exponential_base: 2.0,
            jitter: true,
        }
    }

    /// Delay on attempt `n` (0-indexed): `min(maxDelay, baseDelay *
    /// exponentialBase^n)`, jittered by up to ±25% when `jitter` is set.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let delay = if self.jitter {
            let jitter_range = capped * 0.25;
            let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }
}

/// `fast`: maxRetries=2, baseDelay=0.5s, maxDelay=5s.
pub const RETRY_FAST: RetryConfig = RetryConfig::new(2, 0.5, 5.0);
/// `standard`: maxRetries=3, baseDelay=1s, maxDelay=30s.
pub const RETRY_STANDARD: RetryConfig = RetryConfig::new(3, 1.0, 30.0);
/// `patient`: maxRetries=5, baseDelay=2s, maxDelay=60s.
pub const RETRY_PATIENT: RetryConfig = RetryConfig::new(5, 2.0, 60.0);

/// An operation is retried iff the error's kind is retryable by default or
/// its `recoverable` flag is true.
pub fn should_retry(error: &OmniError) -> bool {
    error.kind.is_default_retryable() || error.recoverable
}

/// Executes `op` with retry, calling `on_retry(error, attempt)` before each
/// wait. Returns the last error if every attempt is exhausted.
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    mut op: F,
    mut on_retry: impl FnMut(&OmniError, u32),
) -> Result<T, OmniError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OmniError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_retries || !should_retry(&err) {
                    return Err(err);
                }
                let delay = config.calculate_delay(attempt);
                on_retry(&err, attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Stateful retry helper for callers that need to interleave their own
/// logic between attempts (the orchestrator's `send-to-agent-with-retry`
/// uses this shape instead of the one-shot `retry_async` wrapper).
pub struct RetryContext {
    config: RetryConfig,
    attempt: u32,
    pub last_error: Option<OmniError>,
    pub total_delay: Duration,
}

impl RetryContext {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
            total_delay: Duration::ZERO,
        }
    }

    pub fn should_continue(&self) -> bool {
        self.attempt <= self.config.max_retries
    }

    pub fn retries_remaining(&self) -> u32 {
        self.config.max_retries.saturating_sub(self.attempt)
    }

    /// Handles a failed attempt: re-raises immediately if the error isn't
    /// retryable or retries are exhausted, otherwise sleeps the computed
    /// delay and advances the attempt counter.
    pub async fn handle_error(&mut self, error: OmniError) -> Result<(), OmniError> {
        if !should_retry(&error) || self.attempt >= self.config.max_retries {
            self.last_error = Some(clone_for_record(&error));
            return Err(error);
        }
        let delay = self.config.calculate_delay(self.attempt);
        self.total_delay += delay;
        self.last_error = Some(clone_for_record(&error));
        tokio::time::sleep(delay).await;
        self.attempt += 1;
        Ok(())
    }
}

fn clone_for_record(error: &OmniError) -> OmniError {
    OmniError::new(error.kind, error.message.clone())
        .recoverable(error.recoverable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_is_capped_and_nonnegative() {
        let cfg = RetryConfig {
            jitter: false,
            ..RETRY_STANDARD
        };
        assert_eq!(cfg.calculate_delay(0), Duration::from_secs_f64(1.0));
        assert_eq!(cfg.calculate_delay(10), cfg.max_delay);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn retry_async_stops_after_max_retries() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 2,
            jitter: false,
            ..RETRY_FAST
        };
        let result: Result<(), OmniError> = retry_async(
            &cfg,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(OmniError::new(ErrorKind::LlmTimeout, "always fails")) }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // 1 + min(maxRetries, N)
    }

    #[tokio::test]
    async fn retry_context_stops_on_unrecoverable_error() {
        let mut ctx = RetryContext::new(RETRY_FAST);
        let err = OmniError::new(ErrorKind::AgentValidation, "bad request");
        assert!(ctx.handle_error(err).await.is_err());
    }

    proptest::proptest! {
        /// Per-attempt delay never exceeds `min(maxDelay, baseDelay*base^i)`.
        #[test]
        fn delay_never_exceeds_its_own_cap(attempt in 0u32..12, base_delay_ms in 1u64..2_000, max_delay_ms in 1u64..10_000) {
            let cfg = RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                exponential_base: 2.0,
                jitter: false,
            };
            let delay = cfg.calculate_delay(attempt);
            prop_assert!(delay <= cfg.max_delay);
        }

        /// Jitter perturbs the delay by at most ±25% of the capped value and
        /// never produces a negative duration.
        #[test]
        fn jittered_delay_stays_within_quarter_of_cap(attempt in 0u32..12, base_delay_ms in 1u64..2_000, max_delay_ms in 1u64..10_000) {
            let cfg = RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                exponential_base: 2.0,
                jitter: true,
            };
            let capped = cfg.base_delay.as_secs_f64() * cfg.exponential_base.powi(attempt as i32);
            let capped = capped.min(cfg.max_delay.as_secs_f64());
            let delay = cfg.calculate_delay(attempt).as_secs_f64();
            prop_assert!(delay >= 0.0);
            prop_assert!(delay <= capped * 1.25 + 1e-9);
        }
    }
}
