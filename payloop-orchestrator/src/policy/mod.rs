//! Policy abstractions for external calls.
//!
//! - [`RetryPolicy`]: bounded exponential backoff around a fallible call
//! - [`ActivityOptions`]: retry policy plus the per-attempt timeout applied by
//!   the call layer

pub mod backoff;
pub mod retry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use retry::{RetryFailure, RetryPolicy};

const fn default_start_to_close_timeout() -> u64 {
    120 // 2 minutes
}

/// How the call layer runs each processor or persistence call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Upper bound on a single attempt (in seconds); an attempt that runs
    /// longer counts as failed.
    ///
    /// Default: 120 seconds
    #[serde(default = "default_start_to_close_timeout")]
    pub start_to_close_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout_secs: default_start_to_close_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    #[must_use]
    pub const fn start_to_close_timeout(&self) -> Duration {
        Duration::from_secs(self.start_to_close_timeout_secs)
    }
}
