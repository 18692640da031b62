//! Price tiers used for deposit sizing and forfeiture sizing.
//!
//! A schedule is an ordered list of `{min, max, rate}` ranges. Evaluation
//! scans in list order and the **first** match wins; ranges are not sorted
//! or checked for overlap. An amount that matches no tier maps to a rate of
//! zero ("nothing required"), which is a valid business outcome.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_money;
use crate::{Result, SettlementError};

/// One price range mapped to a rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Inclusive lower bound.
    #[serde(default)]
    pub min: Decimal,
    /// Inclusive upper bound; `None` means unbounded.
    #[serde(default)]
    pub max: Option<Decimal>,
    /// Fraction of the amount charged when this tier matches.
    #[serde(default)]
    pub rate: Decimal,
}

impl Tier {
    #[must_use]
    pub fn bounded(min: Decimal, max: Decimal, rate: Decimal) -> Self {
        Self {
            min,
            max: Some(max),
            rate,
        }
    }

    #[must_use]
    pub fn unbounded(min: Decimal, rate: Decimal) -> Self {
        Self {
            min,
            max: None,
            rate,
        }
    }

    /// `amount >= min` and (`max` unbounded or `amount <= max`).
    #[must_use]
    pub fn matches(&self, amount: Decimal) -> bool {
        amount >= self.min && self.max.is_none_or(|max| amount <= max)
    }
}

/// Ordered tier list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSchedule {
    #[serde(default)]
    pub tiers: Vec<Tier>,
}

impl TierSchedule {
    #[must_use]
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// Rate of the first tier matching `amount`, or zero.
    #[must_use]
    pub fn rate(&self, amount: Decimal) -> Decimal {
        self.tiers
            .iter()
            .find(|tier| tier.matches(amount))
            .map_or(Decimal::ZERO, |tier| tier.rate)
    }

    /// `amount * rate(amount)`, rounded to the money scale.
    #[must_use]
    pub fn charge(&self, amount: Decimal) -> Decimal {
        round_money(amount * self.rate(amount))
    }

    /// Reject malformed tiers. Gaps between tiers are allowed.
    ///
    /// # Errors
    /// Returns [`SettlementError::Configuration`] on a negative bound or rate,
    /// or a tier whose `max` is below its `min`.
    pub fn validate(&self, name: &str) -> Result<()> {
        for (idx, tier) in self.tiers.iter().enumerate() {
            if tier.min.is_sign_negative() || tier.rate.is_sign_negative() {
                return Err(SettlementError::Configuration(format!(
                    "{name} tier {idx}: min and rate must be non-negative"
                )));
            }
            if let Some(max) = tier.max {
                if max < tier.min {
                    return Err(SettlementError::Configuration(format!(
                        "{name} tier {idx}: max {max} is below min {}",
                        tier.min
                    )));
                }
            }
        }
        Ok(())
    }
}
