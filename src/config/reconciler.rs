//! Reconciler configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Reconciler configuration
///
/// Controls the background sweep that replays parked webhook events and
/// re-checks rows the webhook stream has gone quiet on.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Hours a subscription row may go unwritten before the sweep
    /// re-checks it against the provider
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u64,

    /// Maximum parked events and stale rows handled per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl ReconcilerConfig {
    /// Get the sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Get the freshness threshold as a Duration
    pub fn freshness_threshold(&self) -> Duration {
        Duration::from_secs(self.freshness_hours * 60 * 60)
    }

    /// Validate reconciler configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.freshness_hours == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            freshness_hours: default_freshness_hours(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_freshness_hours() -> u64 {
    24
}

fn default_batch_size() -> u32 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_config_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.freshness_threshold(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_interval() {
        let config = ReconcilerConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_freshness() {
        let config = ReconcilerConfig {
            freshness_hours: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_batch_size_bounds() {
        let config = ReconcilerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReconcilerConfig {
            batch_size: 5000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
