//! Retry backoff for failed exports.
//!
//! Export retries are not performed inline; a failed pending export is
//! rescheduled by stamping `next_retry_at`, and a later execution run picks
//! it up once that time has passed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before an export is terminally failed.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed).
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let delay_ms = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Up to 25% jitter
            let jitter_factor = 1.0 + (rand_simple() * 0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// When a pending export that has failed `error_count` times may run again.
    #[must_use]
    pub fn next_retry_at(&self, error_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.calculate_delay(error_count.saturating_sub(1));
        debug!(
            error_count,
            delay_ms = delay.as_millis() as u64,
            "Scheduling export retry"
        );
        match chrono::Duration::from_std(delay) {
            Ok(delay) => now + delay,
            Err(_) => now + chrono::Duration::seconds(self.max_delay.as_secs() as i64),
        }
    }

    /// Whether another attempt is allowed after `error_count` failures.
    #[must_use]
    pub fn allows_retry(&self, error_count: u32) -> bool {
        error_count < self.max_retries
    }
}

/// Simple pseudo-random number generator for jitter.
fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}
