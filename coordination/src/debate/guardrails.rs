//! Run-level guardrails: moderator pass bound, wall-clock ceiling, cancellation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a guardrail stopped the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No guardrail triggered.
    Continue,
    /// The router kept looping past the hard bound.
    RunawayLoop { passes: u32, bound: u32 },
    /// The cancellation token fired.
    Cancelled,
    /// The per-question ceiling elapsed.
    TimedOut { elapsed_ms: u64, budget_ms: u64 },
}

impl GuardOutcome {
    pub fn should_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl std::fmt::Display for GuardOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::RunawayLoop { passes, bound } => {
                write!(f, "runaway_loop ({} passes > {})", passes, bound)
            }
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut {
                elapsed_ms,
                budget_ms,
            } => write!(f, "timed_out ({}ms / {}ms)", elapsed_ms, budget_ms),
        }
    }
}

/// Tracks one executor run against its limits.
#[derive(Debug)]
pub struct RunGuard {
    max_rounds: u32,
    moderator_passes: u32,
    started: Instant,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl RunGuard {
    /// `prior_passes` counts moderator passes already recorded for this
    /// question (non-zero when resuming).
    pub fn new(
        max_rounds: u32,
        prior_passes: u32,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            max_rounds,
            moderator_passes: prior_passes,
            started: Instant::now(),
            timeout,
            cancel,
        }
    }

    /// Hard bound on moderator passes: `R + 2`.
    pub fn pass_bound(&self) -> u32 {
        self.max_rounds.saturating_add(2)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn moderator_passes(&self) -> u32 {
        self.moderator_passes
    }

    /// Record a moderator pass and check the bound.
    pub fn record_moderator_pass(&mut self) -> GuardOutcome {
        self.moderator_passes += 1;
        if self.moderator_passes > self.pass_bound() {
            return GuardOutcome::RunawayLoop {
                passes: self.moderator_passes,
                bound: self.pass_bound(),
            };
        }
        GuardOutcome::Continue
    }

    /// Checked before every node.
    pub fn check(&self) -> GuardOutcome {
        if self.cancel.is_cancelled() {
            return GuardOutcome::Cancelled;
        }
        if let Some(budget) = self.timeout {
            let elapsed = self.started.elapsed();
            if elapsed >= budget {
                return GuardOutcome::TimedOut {
                    elapsed_ms: elapsed.as_millis() as u64,
                    budget_ms: budget.as_millis() as u64,
                };
            }
        }
        GuardOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_bound_is_rounds_plus_two() {
        let mut guard = RunGuard::new(3, 0, None, CancellationToken::new());
        for _ in 0..5 {
            assert_eq!(guard.record_moderator_pass(), GuardOutcome::Continue);
        }
        assert_eq!(
            guard.record_moderator_pass(),
            GuardOutcome::RunawayLoop { passes: 6, bound: 5 }
        );
    }

    #[test]
    fn test_prior_passes_count_toward_bound() {
        let mut guard = RunGuard::new(1, 3, None, CancellationToken::new());
        assert!(guard.record_moderator_pass().should_stop());
    }

    #[test]
    fn test_cancellation_observed() {
        let token = CancellationToken::new();
        let guard = RunGuard::new(3, 0, None, token.clone());
        assert_eq!(guard.check(), GuardOutcome::Continue);
        token.cancel();
        assert_eq!(guard.check(), GuardOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_observed() {
        let guard = RunGuard::new(3, 0, Some(Duration::from_secs(5)), CancellationToken::new());
        assert_eq!(guard.check(), GuardOutcome::Continue);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(guard.check(), GuardOutcome::TimedOut { budget_ms: 5000, .. }));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(GuardOutcome::Cancelled.to_string(), "cancelled");
        assert_eq!(
            GuardOutcome::RunawayLoop { passes: 6, bound: 5 }.to_string(),
            "runaway_loop (6 passes > 5)"
        );
    }
}
