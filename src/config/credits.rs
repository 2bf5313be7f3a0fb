//! Credit grant configuration

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;

/// Credit grant configuration
///
/// Deployments tune grant sizes here without a code change. Plan codes
/// not present in `plan_credits` keep their catalog defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    /// Credits granted once when a subscription first activates
    #[serde(default = "default_signup_bonus")]
    pub signup_bonus_credits: i64,

    /// Per-plan monthly credit overrides, keyed by plan code
    ///
    /// Example: `CLIPMINT__CREDITS__PLAN_CREDITS__PRO=300`
    #[serde(default)]
    pub plan_credits: HashMap<String, i64>,
}

impl CreditsConfig {
    /// Validate credit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.signup_bonus_credits < 0 {
            return Err(ValidationError::InvalidCreditAmount);
        }
        if self.plan_credits.values().any(|credits| *credits <= 0) {
            return Err(ValidationError::InvalidCreditAmount);
        }
        Ok(())
    }
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            signup_bonus_credits: default_signup_bonus(),
            plan_credits: HashMap::new(),
        }
    }
}

fn default_signup_bonus() -> i64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_config_defaults() {
        let config = CreditsConfig::default();
        assert_eq!(config.signup_bonus_credits, 3);
        assert!(config.plan_credits.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_negative_signup_bonus() {
        let config = CreditsConfig {
            signup_bonus_credits: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_plan_credits() {
        let mut config = CreditsConfig::default();
        config.plan_credits.insert("pro".to_string(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_overrides() {
        let mut config = CreditsConfig::default();
        config.plan_credits.insert("pro".to_string(), 300);
        config.plan_credits.insert("enterprise".to_string(), 1500);
        assert!(config.validate().is_ok());
    }
}
