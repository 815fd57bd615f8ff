//! Orchestrator configuration, read from RON.
//!
//! ```ron
//! (
//!     activities: (
//!         start_to_close_timeout_secs: 120,
//!         retry: (maximum_attempts: 5),
//!     ),
//!     payment: (action_timeout_secs: 900),
//!     webhook: (initial_interval_ms: 10000, maximum_interval_ms: 3600000),
//! )
//! ```
//!
//! Every field has a default, so an empty `()` is a valid config.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use payloop_common::tracing::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, policy::ActivityOptions, webhook::WebhookOptions};

pub const CONFIG_ENV: &str = "PAYLOOP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./payloop.config.ron";

const fn default_action_timeout() -> u64 {
    900 // 15 minutes
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOptions {
    /// How long a payment may wait for customer action (in seconds).
    ///
    /// Default: 900 seconds
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
}

impl Default for PaymentOptions {
    fn default() -> Self {
        Self {
            action_timeout_secs: default_action_timeout(),
        }
    }
}

impl PaymentOptions {
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Processor and order store calls
    #[serde(default)]
    pub activities: ActivityOptions,

    #[serde(default)]
    pub payment: PaymentOptions,

    #[serde(default)]
    pub webhook: WebhookOptions,
}

impl OrchestratorConfig {
    /// Parse a RON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_ron_str(config: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(config)?)
    }

    /// Read and parse a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron_str(&content)
    }

    /// Load the configuration using the following precedence:
    /// 1. `PAYLOOP_CONFIG` environment variable
    /// 2. `./payloop.config.ron` (current working directory)
    /// 3. Built-in defaults
    ///
    /// # Errors
    ///
    /// Fails if `PAYLOOP_CONFIG` names a missing file, or if the chosen file
    /// cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            Path::new(DEFAULT_CONFIG_PATH),
        )
    }

    fn load_from(explicit: Option<PathBuf>, fallback: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path));
            }

            info!(path = %path.display(), "Loading configuration");
            return Self::from_file(&path);
        }

        if fallback.exists() {
            info!(path = %fallback.display(), "Loading configuration");
            return Self::from_file(fallback);
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = OrchestratorConfig::from_ron_str("()").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.payment.action_timeout(), Duration::from_secs(900));
        assert_eq!(
            config.activities.start_to_close_timeout(),
            Duration::from_secs(120)
        );
        assert_eq!(config.webhook.initial_interval_ms, 10_000);
    }

    #[test]
    fn test_partial_overrides() {
        let config = OrchestratorConfig::from_ron_str(
            r"(
                activities: (retry: (maximum_attempts: 3, jitter_factor: 0.1)),
                payment: (action_timeout_secs: 60),
                webhook: (maximum_attempts: 8),
            )",
        )
        .unwrap();

        assert_eq!(config.activities.retry.maximum_attempts, 3);
        assert_eq!(config.activities.retry.initial_interval_ms, 1_000);
        assert_eq!(config.payment.action_timeout_secs, 60);

        assert_eq!(config.webhook.maximum_attempts, 8);
        assert_eq!(config.webhook.initial_interval_ms, 10_000);
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let error = OrchestratorConfig::from_ron_str("(payment: (action_timeout_secs: \"soon\"))")
            .unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("payloop.config.ron");

        let config = OrchestratorConfig::load_from(None, &fallback).unwrap();
        assert_eq!(config, OrchestratorConfig::default());

        std::fs::File::create(&fallback)
            .unwrap()
            .write_all(b"(payment: (action_timeout_secs: 30))")
            .unwrap();
        let config = OrchestratorConfig::load_from(None, &fallback).unwrap();
        assert_eq!(config.payment.action_timeout_secs, 30);

        let explicit = dir.path().join("explicit.ron");
        std::fs::write(&explicit, "(payment: (action_timeout_secs: 45))").unwrap();
        let config = OrchestratorConfig::load_from(Some(explicit), &fallback).unwrap();
        assert_eq!(config.payment.action_timeout_secs, 45);

        let missing = dir.path().join("missing.ron");
        let error = OrchestratorConfig::load_from(Some(missing.clone()), &fallback).unwrap_err();
        assert!(matches!(error, ConfigError::MissingFile(path) if path == missing));
    }
}
