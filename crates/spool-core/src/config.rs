//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::S3_MIN_PART_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("min_part_size {configured} is below the object store minimum of {store_min} bytes")]
    PartSizeBelowStoreMinimum { configured: usize, store_min: usize },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("expiration_secs {configured} exceeds the maximum of {max}")]
    ExpirationTooLong { configured: u64, max: u64 },
}

/// Longest accepted upload lifetime (one year).
pub const MAX_EXPIRATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Resumable upload engine configuration.
///
/// Every field has a default so a partial TOML file (or env overrides only)
/// is enough.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of every flushed non-final part, in bytes.
    #[serde(default = "default_min_part_size")]
    pub min_part_size: usize,
    /// How long an incomplete upload lives before the sweeper may remove it.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
    /// Both the hold limit and the acquisition wait for the per-upload lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Extra lifetime of cache entries beyond the upload expiration.
    #[serde(default = "default_cache_ttl_grace_secs")]
    pub cache_ttl_grace_secs: u64,
    /// Deployment environment; first segment of every object key.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Second segment of every object key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound of ids handed out by one `list_pending_deletion` call.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

fn default_min_part_size() -> usize {
    S3_MIN_PART_SIZE
}

fn default_expiration_secs() -> u64 {
    30 * 60
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_grace_secs() -> u64 {
    10 * 60
}

fn default_environment() -> String {
    "local".to_string()
}

fn default_key_prefix() -> String {
    "tus".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_sweep_batch_size() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
            expiration_secs: default_expiration_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            cache_ttl_grace_secs: default_cache_ttl_grace_secs(),
            environment: default_environment(),
            key_prefix: default_key_prefix(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

impl EngineConfig {
    /// Validate against the object store's own part-size floor.
    pub fn validate(&self, store_min_part_size: usize) -> Result<(), ConfigError> {
        if self.min_part_size < store_min_part_size {
            return Err(ConfigError::PartSizeBelowStoreMinimum {
                configured: self.min_part_size,
                store_min: store_min_part_size,
            });
        }
        if self.min_part_size == 0 {
            return Err(ConfigError::Zero("min_part_size"));
        }
        if self.expiration_secs == 0 {
            return Err(ConfigError::Zero("expiration_secs"));
        }
        if self.expiration_secs > MAX_EXPIRATION_SECS {
            return Err(ConfigError::ExpirationTooLong {
                configured: self.expiration_secs,
                max: MAX_EXPIRATION_SECS,
            });
        }
        if self.lock_timeout_secs == 0 {
            return Err(ConfigError::Zero("lock_timeout_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero("sweep_interval_secs"));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Zero("sweep_batch_size"));
        }
        Ok(())
    }

    /// Upload lifetime as a calendar offset; clamped to the accepted maximum.
    pub fn expiration_delta(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiration_secs.min(MAX_EXPIRATION_SECS) as i64)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// TTL for every per-upload cache entry.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.expiration_secs + self.cache_ttl_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid_for_s3() {
        let config = EngineConfig::default();

        assert!(config.validate(S3_MIN_PART_SIZE).is_ok());
        assert_eq!(config.expiration_delta(), chrono::Duration::minutes(30));
        assert_eq!(config.cache_ttl(), Duration::from_secs(2400));
    }

    #[test]
    fn part_size_below_store_minimum_is_rejected() {
        let config = EngineConfig {
            min_part_size: S3_MIN_PART_SIZE - 1,
            ..EngineConfig::default()
        };

        assert!(matches!(
            config.validate(S3_MIN_PART_SIZE),
            Err(ConfigError::PartSizeBelowStoreMinimum { configured, store_min })
                if configured == S3_MIN_PART_SIZE - 1 && store_min == S3_MIN_PART_SIZE
        ));
    }

    #[rstest]
    #[case::expiration(EngineConfig { expiration_secs: 0, ..EngineConfig::default() }, "expiration_secs")]
    #[case::lock_timeout(EngineConfig { lock_timeout_secs: 0, ..EngineConfig::default() }, "lock_timeout_secs")]
    #[case::sweep_interval(EngineConfig { sweep_interval_secs: 0, ..EngineConfig::default() }, "sweep_interval_secs")]
    #[case::sweep_batch(EngineConfig { sweep_batch_size: 0, ..EngineConfig::default() }, "sweep_batch_size")]
    fn zero_values_are_rejected(#[case] config: EngineConfig, #[case] field: &str) {
        assert!(matches!(config.validate(S3_MIN_PART_SIZE), Err(ConfigError::Zero(f)) if f == field));
    }

    #[test]
    fn overlong_expiration_is_rejected() {
        let config = EngineConfig {
            expiration_secs: MAX_EXPIRATION_SECS + 1,
            ..EngineConfig::default()
        };

        assert!(matches!(
            config.validate(S3_MIN_PART_SIZE),
            Err(ConfigError::ExpirationTooLong { .. })
        ));
        assert_eq!(
            config.expiration_delta(),
            chrono::Duration::seconds(MAX_EXPIRATION_SECS as i64)
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"min_part_size": 8388608, "environment": "staging"}"#).unwrap();

        assert_eq!(config.min_part_size, 8 * 1024 * 1024);
        assert_eq!(config.environment, "staging");
        assert_eq!(config.key_prefix, "tus");
        assert_eq!(config.lock_timeout_secs, 30);
    }
}
