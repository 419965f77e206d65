//! Retry with jittered exponential backoff for completion calls.
//!
//! Only `rate_limited` and `unavailable` failures are retried. Every wait is
//! announced to a [`RetrySink`] first so the presentation layer can show a
//! "cooling down" notice, and every wait can be cut short by the run's
//! cancellation token.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{CompletionProvider, CompletionRequest, ProviderError};

/// Emitted immediately before a backoff wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryEvent {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub wait_seconds: f64,
}

/// Receives retry notifications. Implementations must not block.
pub trait RetrySink: Send + Sync {
    fn emit(&self, event: RetryEvent);
}

impl RetrySink for mpsc::UnboundedSender<RetryEvent> {
    fn emit(&self, event: RetryEvent) {
        // receiver gone means nobody is watching
        let _ = self.send(event);
    }
}

/// Discards retry notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl RetrySink for NoopSink {
    fn emit(&self, _event: RetryEvent) {}
}

/// Why a wrapped call gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Non-retryable error kind.
    Fatal,
    /// Attempt budget used up on retryable errors.
    Exhausted,
    /// Cancelled during a backoff wait.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider call failed after {attempts} attempt(s) ({reason}): {last_error}")]
pub struct ProviderCallFailed {
    pub attempts: u32,
    pub reason: FailureReason,
    pub last_error: ProviderError,
}

impl ProviderCallFailed {
    pub fn is_cancelled(&self) -> bool {
        self.reason == FailureReason::Cancelled
    }
}

/// Backoff parameters plus the notification sink and cancellation token.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    /// Lower bound of every wait, and the first exponential step.
    pub min_wait: Duration,
    /// Upper bound of the exponential step.
    pub max_wait: Duration,
    pub multiplier: f64,
    /// Uniform jitter in `[0, bound]` (then floored at `min_wait`).
    pub jitter: bool,
    sink: Arc<dyn RetrySink>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
            sink: Arc::new(NoopSink),
            cancel: None,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_min_wait(mut self, wait: Duration) -> Self {
        self.min_wait = wait;
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RetrySink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Exponential upper bound for the wait after `attempt` failed:
    /// `min(max_wait, min_wait * multiplier^(attempt-1))`.
    pub fn backoff_bound(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.min_wait.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_wait.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Actual wait after `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let bound = self.backoff_bound(attempt);
        let wait = if self.jitter && !bound.is_zero() {
            let secs = rand::thread_rng().gen_range(0.0..=bound.as_secs_f64());
            Duration::from_secs_f64(secs)
        } else {
            bound
        };
        wait.max(self.min_wait)
    }

    /// Run `op` until it succeeds, fails fatally, exhausts the attempt
    /// budget, or is cancelled during a wait.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderCallFailed>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "provider call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "provider call failed, not retryable");
                return Err(ProviderCallFailed {
                    attempts: attempt,
                    reason: FailureReason::Fatal,
                    last_error: err,
                });
            }
            if attempt >= max_attempts {
                warn!(attempt, error = %err, "provider call failed, attempts exhausted");
                return Err(ProviderCallFailed {
                    attempts: attempt,
                    reason: FailureReason::Exhausted,
                    last_error: err,
                });
            }

            let wait = self.backoff(attempt);
            self.sink.emit(RetryEvent {
                attempt,
                wait_seconds: wait.as_secs_f64(),
            });
            warn!(
                attempt,
                max_attempts,
                backoff_secs = wait.as_secs_f64(),
                error = %err,
                "transient provider failure, cooling down"
            );

            if let Some(token) = &self.cancel {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(ProviderCallFailed {
                            attempts: attempt,
                            reason: FailureReason::Cancelled,
                            last_error: err,
                        });
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            } else {
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Issue `request` through `policy`.
pub async fn complete_with_retry(
    provider: &dyn CompletionProvider,
    policy: &RetryPolicy,
    request: &CompletionRequest,
) -> Result<String, ProviderCallFailed> {
    policy.run(move || provider.complete(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn channel_policy() -> (RetryPolicy, mpsc::UnboundedReceiver<RetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RetryPolicy::new().with_sink(Arc::new(tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RetryEvent>) -> Vec<RetryEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_bounds_grow_then_cap() {
        let policy = RetryPolicy::new();
        let secs: Vec<u64> = (1..=7).map(|a| policy.backoff_bound(a).as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_backoff_within_floor_and_bound() {
        let policy = RetryPolicy::new();
        for attempt in 1..=10 {
            for _ in 0..50 {
                let wait = policy.backoff(attempt);
                assert!(wait >= Duration::from_secs(2));
                assert!(wait <= policy.backoff_bound(attempt).max(Duration::from_secs(2)));
            }
        }
    }

    #[test]
    fn test_backoff_without_jitter_is_bound() {
        let policy = RetryPolicy::new().with_jitter(false);
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let (policy, mut rx) = channel_policy();
        let calls = AtomicU32::new(0);

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 4 {
                        Err(ProviderError::rate_limited("slow down"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        let attempts: Vec<u32> = events.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_retryable_exhausts_after_ten() {
        let (policy, mut rx) = channel_policy();
        let calls = AtomicU32::new(0);

        let err = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::unavailable("503")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 10);
        assert_eq!(err.reason, FailureReason::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(drain(&mut rx).len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let (policy, mut rx) = channel_policy();

        let err = policy
            .run(|| async { Err::<(), _>(ProviderError::auth("bad key")) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(err.reason, FailureReason::Fatal);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let token = CancellationToken::new();
        let policy = RetryPolicy::new()
            .with_jitter(false)
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });

        let err = policy
            .run(|| async { Err::<(), _>(ProviderError::rate_limited("429")) })
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts, 1);
    }
}
