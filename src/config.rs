//! Retry configuration files.
//!
//! A config file is a JSON object whose fields are all optional; anything
//! left out falls back to the defaults of [`RetryPolicy`]:
//!
//! ```json
//! { "maxAttempts": 5, "initialDelayMs": 200, "backoffMultiplier": 2, "maxDelayMs": 10000 }
//! ```

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{RetryPolicy, is_retryable};
use crate::runtime::Runtime;

/// Environment variable naming a config file to use instead of the default.
pub const CONFIG_ENV: &str = "RETRIER_CONFIG";

/// Partial retry configuration. Unset fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default, alias = "max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default, alias = "initial_delay_ms")]
    pub initial_delay_ms: Option<u64>,
    #[serde(default, alias = "backoff_multiplier")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, alias = "max_delay_ms")]
    pub max_delay_ms: Option<u64>,
    /// Only retry failures that [`is_retryable`] accepts.
    #[serde(default, alias = "transient_only")]
    pub transient_only: Option<bool>,
}

impl RetryConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid retry configuration")
    }

    /// Reads a config file.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        debug!("Loading retry configuration from {:?}", path);
        let json = runtime.read_to_string(path)?;
        Self::from_json_str(&json).with_context(|| format!("Failed to load {:?}", path))
    }

    /// Finds and reads the config file to use, if any.
    ///
    /// An explicit path wins, then `$RETRIER_CONFIG`, then
    /// `<config dir>/retrier/config.json`. Only the default location may be
    /// absent; a missing explicit file is an error.
    pub fn discover<R: Runtime>(runtime: &R, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(runtime, path);
        }

        if let Ok(path) = runtime.env_var(CONFIG_ENV) {
            return Self::load(runtime, Path::new(&path));
        }

        match default_config_path(runtime) {
            Some(path) if runtime.exists(&path) => Self::load(runtime, &path),
            _ => {
                debug!("No retry configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Overlays the fields set in `other` on top of `self`.
    pub fn merge(self, other: RetryConfig) -> Self {
        Self {
            max_attempts: other.max_attempts.or(self.max_attempts),
            initial_delay_ms: other.initial_delay_ms.or(self.initial_delay_ms),
            backoff_multiplier: other.backoff_multiplier.or(self.backoff_multiplier),
            max_delay_ms: other.max_delay_ms.or(self.max_delay_ms),
            transient_only: other.transient_only.or(self.transient_only),
        }
    }

    /// Applies defaults field by field and validates the result.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let defaults = RetryPolicy::default();

        let mut policy = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            ..defaults
        };

        if self.transient_only.unwrap_or(false) {
            policy = policy.retry_if(is_retryable);
        }

        policy.validate().context("Invalid retry configuration")?;
        Ok(policy)
    }
}

fn default_config_path<R: Runtime>(runtime: &R) -> Option<PathBuf> {
    runtime
        .config_dir()
        .map(|dir| dir.join("retrier").join("config.json"))
}
