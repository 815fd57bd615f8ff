//! Retry policy for external calls.
//!
//! Every call to a volatile collaborator (processor, order store, webhook
//! transport) runs through [`RetryPolicy::execute`] or
//! [`RetryPolicy::execute_if`]. The policy only decides *when* to try again;
//! whether an error is worth retrying is up to the call site.

use std::{fmt::Display, future::Future, time::Duration};

use payloop_common::tracing::{debug, warn};
use serde::{Deserialize, Serialize};

use super::backoff::calculate_delay;

/// Bounded exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry (in milliseconds).
    ///
    /// Default: 1 second
    #[serde(default = "defaults::initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Upper bound for any single delay (in milliseconds).
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::maximum_interval_ms")]
    pub maximum_interval_ms: u64,

    /// Multiplicative growth of the delay per retry.
    ///
    /// Default: 2.0
    #[serde(default = "defaults::backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Maximum number of attempts, the first one included.
    ///
    /// Default: 5 attempts
    #[serde(default = "defaults::maximum_attempts")]
    pub maximum_attempts: u32,

    /// Jitter factor for randomizing delays (±`jitter_factor`).
    ///
    /// Default: 0.0 (exact delays)
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: defaults::initial_interval_ms(),
            maximum_interval_ms: defaults::maximum_interval_ms(),
            backoff_coefficient: defaults::backoff_coefficient(),
            maximum_attempts: defaults::maximum_attempts(),
            jitter_factor: 0.0,
        }
    }
}

/// The error from the last attempt, once no more attempts will be made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Number of times the operation ran
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    #[must_use]
    pub const fn maximum_interval(&self) -> Duration {
        Duration::from_millis(self.maximum_interval_ms)
    }

    /// Attempt ceiling. A configured value of zero still permits one attempt.
    #[must_use]
    pub const fn attempt_limit(&self) -> u32 {
        if self.maximum_attempts == 0 {
            1
        } else {
            self.maximum_attempts
        }
    }

    /// Check if another attempt is allowed after `attempt_count` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.attempt_limit()
    }

    /// Get the number of remaining attempts.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.attempt_limit().saturating_sub(attempt_count)
    }

    /// Check if attempt number `attempt` (1-indexed) is the last one allowed.
    #[must_use]
    pub const fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt >= self.attempt_limit()
    }

    /// Delay to wait after `attempt` (1-indexed) failed, before the next one.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_delay(
            attempt,
            self.initial_interval(),
            self.maximum_interval(),
            self.backoff_coefficient,
            self.jitter_factor,
        )
    }

    /// Run `op` until it succeeds or the attempt ceiling is reached, treating
    /// every error as retryable.
    ///
    /// `op` receives the 1-indexed attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error and the attempt count once attempts run out.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, |_| true, op).await
    }

    /// Like [`RetryPolicy::execute`], but stops early on errors for which
    /// `retryable` returns `false`.
    ///
    /// # Errors
    ///
    /// Returns the last error and the attempt count once attempts run out or
    /// a non-retryable error is seen.
    pub async fn execute_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        retryable: P,
        mut op: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;

        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if self.is_final_attempt(attempt) || !retryable(&error) {
                debug!(
                    operation,
                    attempt,
                    error = %error,
                    "Giving up on operation"
                );
                return Err(RetryFailure {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt,
                remaining = self.remaining_attempts(attempt),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Attempt failed, retrying"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

mod defaults {
    pub const fn initial_interval_ms() -> u64 {
        1_000
    }

    pub const fn maximum_interval_ms() -> u64 {
        60_000
    }

    pub const fn backoff_coefficient() -> f64 {
        2.0
    }

    pub const fn maximum_attempts() -> u32 {
        5
    }
}
