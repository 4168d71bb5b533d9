//! Per-record backoff for explorer status probes
//!
//! A failed probe is indistinguishable from a still-pending transaction, so
//! the first few failures are swallowed and the record is simply probed again
//! on the next tick. Past that, probes are spaced out exponentially and the
//! user is told once that the status cannot be determined.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Probe backoff configuration
#[derive(Debug, Clone)]
pub struct ProbeBackoffConfig {
    /// Consecutive failures swallowed before backoff starts
    pub quiet_failures: u32,
    /// Consecutive failures after which the user is notified (once)
    pub surface_after: u32,
    /// First backoff delay once quiet failures are exhausted
    pub initial_backoff: Duration,
    /// Maximum backoff delay
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub multiplier: f64,
}

impl Default for ProbeBackoffConfig {
    fn default() -> Self {
        Self {
            quiet_failures: 3,
            surface_after: 5,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(600),
            multiplier: 2.0,
        }
    }
}

impl ProbeBackoffConfig {
    /// Delay before the next probe after `failures` consecutive failures.
    ///
    /// Zero while failures are still in the quiet window.
    pub fn backoff_for_failures(&self, failures: u32) -> Duration {
        if failures <= self.quiet_failures {
            return Duration::ZERO;
        }
        let exponent = (failures - self.quiet_failures - 1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

/// Outcome of recording a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Swallow; probe again on the next tick
    Retry,
    /// Skip probes until the given time
    Defer(DateTime<Utc>),
    /// Defer, and notify the user that status checks keep failing
    Surface(DateTime<Utc>),
}

/// Backoff state for one tracked record
#[derive(Debug, Clone, Default)]
pub struct ProbeBackoff {
    pub consecutive_failures: u32,
    pub next_probe_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Whether the user has already been told about this streak
    pub surfaced: bool,
}

impl ProbeBackoff {
    /// Check if the record may be probed now
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.next_probe_at {
            Some(at) => now >= at,
            None => true,
        }
    }

    /// Record a failed probe and decide what happens next
    pub fn record_failure(
        &mut self,
        config: &ProbeBackoffConfig,
        error: String,
        now: DateTime<Utc>,
    ) -> FailureAction {
        self.consecutive_failures += 1;
        self.last_error = Some(error);

        let backoff = config.backoff_for_failures(self.consecutive_failures);
        if backoff.is_zero() {
            self.next_probe_at = None;
        } else {
            let delay =
                chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(60));
            self.next_probe_at = Some(now + delay);
        }

        debug!(
            failures = self.consecutive_failures,
            ?backoff,
            "Status probe failed"
        );

        match self.next_probe_at {
            Some(at) if self.consecutive_failures >= config.surface_after && !self.surfaced => {
                self.surfaced = true;
                FailureAction::Surface(at)
            }
            Some(at) => FailureAction::Defer(at),
            None if self.consecutive_failures >= config.surface_after && !self.surfaced => {
                self.surfaced = true;
                FailureAction::Surface(now)
            }
            None => FailureAction::Retry,
        }
    }

    /// Reset after any successful probe
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let config = ProbeBackoffConfig::default();

        assert_eq!(config.backoff_for_failures(0), Duration::ZERO);
        assert_eq!(config.backoff_for_failures(3), Duration::ZERO);
        assert_eq!(config.backoff_for_failures(4), Duration::from_secs(30));
        assert_eq!(config.backoff_for_failures(5), Duration::from_secs(60));
        assert_eq!(config.backoff_for_failures(6), Duration::from_secs(120));
        assert_eq!(config.backoff_for_failures(9), Duration::from_secs(600)); // capped
        assert_eq!(config.backoff_for_failures(50), Duration::from_secs(600));
    }

    #[test]
    fn test_quiet_failures_retry_next_tick() {
        let config = ProbeBackoffConfig::default();
        let now = Utc::now();
        let mut state = ProbeBackoff::default();

        for _ in 0..3 {
            assert_eq!(
                state.record_failure(&config, "timeout".into(), now),
                FailureAction::Retry
            );
            assert!(state.is_ready(now));
        }
    }

    #[test]
    fn test_defer_then_surface_once() {
        let config = ProbeBackoffConfig::default();
        let now = Utc::now();
        let mut state = ProbeBackoff::default();

        for _ in 0..3 {
            state.record_failure(&config, "timeout".into(), now);
        }

        let fourth = state.record_failure(&config, "timeout".into(), now);
        assert_eq!(fourth, FailureAction::Defer(now + chrono::Duration::seconds(30)));
        assert!(!state.is_ready(now));
        assert!(state.is_ready(now + chrono::Duration::seconds(30)));

        let fifth = state.record_failure(&config, "timeout".into(), now);
        assert_eq!(fifth, FailureAction::Surface(now + chrono::Duration::seconds(60)));

        let sixth = state.record_failure(&config, "timeout".into(), now);
        assert!(matches!(sixth, FailureAction::Defer(_)));
    }

    #[test]
    fn test_reset() {
        let config = ProbeBackoffConfig::default();
        let now = Utc::now();
        let mut state = ProbeBackoff::default();
        for _ in 0..6 {
            state.record_failure(&config, "boom".into(), now);
        }
        state.reset();
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.surfaced);
        assert!(state.is_ready(now));
    }
}
