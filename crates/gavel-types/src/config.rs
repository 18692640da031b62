//! Configuration for the settlement engine.
//!
//! Loaded from JSON. Every field has a default, so a partial document only
//! needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::{Result, SettlementError, TierSchedule};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementConfig {
    /// Tiers sizing the deposit held from a winner at close.
    #[serde(default)]
    pub deposit_rules: TierSchedule,
    /// Tiers sizing the forfeiture taken when a winner goes silent.
    #[serde(default)]
    pub forfeit_rules: TierSchedule,
    /// Grace period after auction end before forfeiture.
    #[serde(default = "default_deadline_hours")]
    pub winner_deadline_hours: u32,
    /// Currency used when a caller does not name one.
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub sweeps: SweepConfig,
}

fn default_deadline_hours() -> u32 {
    constants::DEFAULT_WINNER_DEADLINE_HOURS
}

fn default_currency() -> String {
    constants::DEFAULT_CURRENCY.to_string()
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            deposit_rules: TierSchedule::default(),
            forfeit_rules: TierSchedule::default(),
            winner_deadline_hours: default_deadline_hours(),
            default_currency: default_currency(),
            retry: RetryPolicy::default(),
            webhook: WebhookConfig::default(),
            sweeps: SweepConfig::default(),
        }
    }
}

impl SettlementConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    ///
    /// # Errors
    /// Returns [`SettlementError::Configuration`] if the document is not
    /// valid JSON for this shape.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SettlementError::Configuration(format!("parse: {e}")))
    }

    /// Read and parse a JSON file, then validate it.
    ///
    /// # Errors
    /// Returns [`SettlementError::Io`] if the file cannot be read and
    /// [`SettlementError::Configuration`] if it does not parse or validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`SettlementError::Configuration`] naming the first problem.
    pub fn validate(&self) -> Result<()> {
        self.deposit_rules.validate("deposit")?;
        self.forfeit_rules.validate("forfeit")?;
        if self.default_currency.trim().is_empty() {
            return Err(SettlementError::Configuration(
                "defaultCurrency must not be empty".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettlementError::Configuration(
                "retry.maxAttempts must be at least 1".into(),
            ));
        }
        if self.webhook.signing_secret.is_empty() {
            return Err(SettlementError::Configuration(
                "webhook.signingSecret must be set".into(),
            ));
        }
        if self.webhook.tolerance_secs <= 0 {
            return Err(SettlementError::Configuration(
                "webhook.toleranceSecs must be positive".into(),
            ));
        }
        if self.sweeps.close_interval_secs == 0 || self.sweeps.deadline_interval_secs == 0 {
            return Err(SettlementError::Configuration(
                "sweep intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Winner deadline as a chrono duration.
    #[must_use]
    pub fn winner_deadline(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.winner_deadline_hours))
    }
}

/// Bounded retry budget for a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: constants::DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before attempt `attempt + 1` (zero-based), capped
    /// at `max_delay_ms`. Jitter is added by the runner.
    #[must_use]
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// No sleeping between attempts. Used by tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Gateway webhook verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Shared HMAC secret.
    #[serde(default)]
    pub signing_secret: String,
    /// Maximum age (and future skew) of a signed timestamp.
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: i64,
}

fn default_tolerance() -> i64 {
    constants::DEFAULT_WEBHOOK_TOLERANCE_SECS
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            tolerance_secs: default_tolerance(),
        }
    }
}

/// Sweep trigger intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    pub close_interval_secs: u64,
    pub deadline_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            close_interval_secs: constants::DEFAULT_CLOSE_INTERVAL_SECS,
            deadline_interval_secs: constants::DEFAULT_DEADLINE_INTERVAL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn valid() -> SettlementConfig {
        let mut cfg = SettlementConfig::default();
        cfg.webhook.signing_secret = "whsec_test".into();
        cfg
    }

    #[test]
    fn defaults() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.winner_deadline_hours, 48);
        assert_eq!(cfg.default_currency, "aed");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.webhook.tolerance_secs, 300);
        assert_eq!(cfg.sweeps.close_interval_secs, 60);
        assert_eq!(cfg.sweeps.deadline_interval_secs, 300);
        assert_eq!(cfg.winner_deadline(), chrono::Duration::hours(48));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "depositRules": {"tiers": [{"min": "0", "max": "5000", "rate": "0.05"},
                                       {"min": "5000", "rate": "0.08"}]},
            "winnerDeadlineHours": 24,
            "webhook": {"signingSecret": "whsec_abc"}
        }"#;
        let cfg = SettlementConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.winner_deadline_hours, 24);
        assert_eq!(cfg.deposit_rules.tiers.len(), 2);
        assert!(cfg.forfeit_rules.tiers.is_empty());
        assert_eq!(cfg.webhook.tolerance_secs, 300);
        assert_eq!(cfg.deposit_rules.charge(Decimal::new(6000, 0)), Decimal::new(480, 0));
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_json_is_configuration_error() {
        let err = SettlementConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SettlementError::Configuration(_)));
    }

    #[test]
    fn validate_rejects_empty_secret() {
        assert!(SettlementConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_budget_and_intervals() {
        let mut cfg = valid();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.sweeps.close_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 20);
        assert_eq!(policy.backoff_ms(1), 40);
        assert_eq!(policy.backoff_ms(3), 160);
        assert_eq!(policy.backoff_ms(10), 500);
        assert_eq!(RetryPolicy::immediate(3).backoff_ms(5), 0);
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let err = SettlementConfig::load_from("/nonexistent/gavel.json").unwrap_err();
        assert!(matches!(err, SettlementError::Io(_)));
    }
}
