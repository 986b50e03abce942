//! Enforcer and driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default label key carrying the content hash.
pub const DEFAULT_HASH_LABEL: &str = "converge.io/content-hash";

/// Maximum length of a label value.
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Shortest hash we accept; anything shorter collides too easily.
pub const MIN_HASH_LEN: usize = 8;

/// Configuration for the state enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// Label key the content hash is stored under.
    pub hash_label_key: String,
    /// Number of hex digits kept from the digest.
    pub hash_length: usize,
    /// Delete owned objects whose hash is no longer desired.
    pub prune_stale: bool,
    /// Label stamped on every desired object, if any.
    pub managed_by_label: Option<(String, String)>,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            hash_label_key: DEFAULT_HASH_LABEL.to_string(),
            hash_length: MAX_LABEL_VALUE_LEN,
            prune_stale: true,
            managed_by_label: Some((
                "app.kubernetes.io/managed-by".to_string(),
                "converge".to_string(),
            )),
        }
    }
}

impl EnforcerConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> EnforcerConfigBuilder {
        EnforcerConfigBuilder::default()
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty label key or a hash
    /// length outside `8..=63`.
    pub fn validate(&self) -> Result<()> {
        if self.hash_label_key.is_empty() {
            return Err(Error::invalid_config("hash_label_key must not be empty"));
        }
        if !(MIN_HASH_LEN..=MAX_LABEL_VALUE_LEN).contains(&self.hash_length) {
            return Err(Error::invalid_config(format!(
                "hash_length must be within {MIN_HASH_LEN}..={MAX_LABEL_VALUE_LEN}, got {}",
                self.hash_length
            )));
        }
        if let Some((key, _)) = &self.managed_by_label {
            if key == &self.hash_label_key {
                return Err(Error::invalid_config(
                    "managed_by_label must not reuse the hash label key",
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`EnforcerConfig`].
#[derive(Debug, Default)]
pub struct EnforcerConfigBuilder {
    config: EnforcerConfig,
}

impl EnforcerConfigBuilder {
    /// Set the hash label key.
    #[must_use]
    pub fn hash_label_key(mut self, key: impl Into<String>) -> Self {
        self.config.hash_label_key = key.into();
        self
    }

    /// Set the number of hex digits kept.
    #[must_use]
    pub const fn hash_length(mut self, length: usize) -> Self {
        self.config.hash_length = length;
        self
    }

    /// Enable/disable stale object pruning.
    #[must_use]
    pub const fn prune_stale(mut self, enabled: bool) -> Self {
        self.config.prune_stale = enabled;
        self
    }

    /// Set the managed-by label, or `None` to stamp nothing.
    #[must_use]
    pub fn managed_by_label(mut self, label: Option<(String, String)>) -> Self {
        self.config.managed_by_label = label;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// See [`EnforcerConfig::validate`].
    pub fn build(self) -> Result<EnforcerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the retry driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Passes attempted before giving up.
    pub max_passes: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between passes.
    pub max_backoff: Duration,
    /// Deadline for a single pass; `None` waits indefinitely.
    pub pass_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_passes: 16,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            pass_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DriverConfig {
    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no pass is allowed or the
    /// backoff bounds are inverted.
    pub fn validate(&self) -> Result<()> {
        if self.max_passes == 0 {
            return Err(Error::invalid_config("max_passes must be at least 1"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(Error::invalid_config(
                "initial_backoff must not exceed max_backoff",
            ));
        }
        Ok(())
    }

    /// Backoff before pass `attempt` (1-based retries), doubling up to
    /// `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
