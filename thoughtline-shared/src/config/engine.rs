//! Timings and limits of the comment engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timings and bounds of the panel engine. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Time allowed for the embed script to fire its load event.
    pub load_timeout_ms: u64,
    /// Consecutive load failures tolerated before the panel errors out.
    pub max_retries: u32,
    /// Backoff unit; the n-th retry waits `n` units.
    pub retry_backoff_base_ms: u64,
    /// Period of the content-marker check after the load event.
    pub readiness_poll_interval_ms: u64,
    /// Checks before a loaded widget counts as not ready.
    pub readiness_max_polls: u32,
    /// Delay after which an opening panel is scrolled into view even if the
    /// widget is not ready yet.
    pub scroll_grace_ms: u64,
    /// Period of the Observed re-scrape while a panel is open.
    pub reconcile_interval_ms: u64,
    /// Delay of the re-scrape after a submission.
    pub observed_followup_ms: u64,
    /// Delay of the remote confirmation after a submission.
    pub remote_followup_ms: u64,
    /// Submission signals closer together than this are one user action.
    pub submission_echo_window_ms: u64,
    /// Retries of a transiently failed remote query.
    pub remote_retry_limit: u32,
    /// Backoff unit; the n-th remote retry waits `n` units.
    pub remote_retry_base_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 15_000,
            max_retries: 3,
            retry_backoff_base_ms: 1_000,
            readiness_poll_interval_ms: 1_000,
            readiness_max_polls: 30,
            scroll_grace_ms: 300,
            reconcile_interval_ms: 2_000,
            observed_followup_ms: 300,
            remote_followup_ms: 800,
            submission_echo_window_ms: 250,
            remote_retry_limit: 3,
            remote_retry_base_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// See [`EngineConfig::load_timeout_ms`].
    #[must_use]
    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Delay before re-mounting after the `retry_count`-th failure.
    #[must_use]
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms.saturating_mul(u64::from(retry_count)))
    }

    /// See [`EngineConfig::readiness_poll_interval_ms`].
    #[must_use]
    pub const fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    /// See [`EngineConfig::scroll_grace_ms`].
    #[must_use]
    pub const fn scroll_grace(&self) -> Duration {
        Duration::from_millis(self.scroll_grace_ms)
    }

    /// See [`EngineConfig::reconcile_interval_ms`].
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// See [`EngineConfig::observed_followup_ms`].
    #[must_use]
    pub const fn observed_followup(&self) -> Duration {
        Duration::from_millis(self.observed_followup_ms)
    }

    /// See [`EngineConfig::remote_followup_ms`].
    #[must_use]
    pub const fn remote_followup(&self) -> Duration {
        Duration::from_millis(self.remote_followup_ms)
    }

    /// See [`EngineConfig::submission_echo_window_ms`].
    #[must_use]
    pub const fn submission_echo_window(&self) -> Duration {
        Duration::from_millis(self.submission_echo_window_ms)
    }

    /// Delay before the `attempt`-th remote retry.
    #[must_use]
    pub fn remote_retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.remote_retry_base_ms.saturating_mul(u64::from(attempt)))
    }

    /// Problems with the timings, one message per problem.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(10_000..=15_000).contains(&self.load_timeout_ms) {
            problems.push(format!(
                "loadTimeoutMs must be between 10000 and 15000, got {}",
                self.load_timeout_ms
            ));
        }
        if self.max_retries == 0 {
            problems.push("maxRetries must be at least 1".to_string());
        }
        if self.readiness_max_polls == 0 {
            problems.push("readinessMaxPolls must be at least 1".to_string());
        }
        for (name, value) in [
            ("readinessPollIntervalMs", self.readiness_poll_interval_ms),
            ("reconcileIntervalMs", self.reconcile_interval_ms),
        ] {
            if value == 0 {
                problems.push(format!("{name} must be greater than 0"));
            }
        }
        problems
    }
}
