//! Retry policy for failed jobs.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::MonitorSettings;
use crate::rules::ScanError;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before permanent failure.
    pub max_attempts: u32,
    /// Initial backoff duration in seconds.
    pub initial_backoff_secs: u64,
    /// Maximum backoff duration in seconds (cap for exponential growth).
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &MonitorSettings) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff_secs: config.initial_backoff_secs,
            max_backoff_secs: config.max_backoff_secs,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Check if a failed job should be retried given how many attempts it
    /// has already made.
    ///
    /// Returns true if:
    /// - The error type is retryable (e.g., not an undecodable job kind)
    /// - Fewer than `max_attempts` attempts have been made
    pub fn should_retry(&self, error: &ScanError, attempts_made: u32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }

    /// Calculate the next retry timestamp after `attempts_made` attempts.
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^(attempts - 1)`,
    /// capped at `max_backoff_secs`.
    ///
    /// Returns a Unix timestamp (seconds since epoch).
    pub fn next_retry_at(&self, attempts_made: u32) -> i64 {
        chrono::Utc::now().timestamp() + self.backoff_secs(attempts_made) as i64
    }

    /// Calculate backoff duration in seconds after `attempts_made` attempts.
    ///
    /// The first retry waits `initial_backoff_secs`; each further attempt
    /// multiplies the wait, up to the cap.
    pub fn backoff_secs(&self, attempts_made: u32) -> u64 {
        let exponent = attempts_made.saturating_sub(1) as i32;
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        (backoff.min(self.max_backoff_secs as f64)) as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 5,
            max_backoff_secs: 600, // 10 minutes
            backoff_multiplier: 2.0,
        }
    }
}
