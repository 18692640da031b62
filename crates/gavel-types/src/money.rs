//! Major/minor unit conversion at the gateway boundary.
//!
//! Internally every amount is a major-unit [`Decimal`]. The gateway speaks
//! integer minor units, so conversion happens exactly once on the way out
//! (charge creation, refunds) and once on the way in (event amounts).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::{MINOR_UNITS_PER_MAJOR, MONEY_SCALE};
use crate::{Result, SettlementError};

/// Round a major-unit amount to the money scale.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a positive major-unit amount to gateway minor units.
///
/// # Errors
/// Returns [`SettlementError::InvalidAmount`] if the amount is not positive
/// after rounding or does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    let minor = (amount * Decimal::from(MINOR_UNITS_PER_MAJOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let minor = minor.to_i64().ok_or_else(|| SettlementError::InvalidAmount {
        reason: format!("{amount} does not fit in minor units"),
    })?;
    if minor <= 0 {
        return Err(SettlementError::InvalidAmount {
            reason: format!("{amount} is {minor} minor units, must be positive"),
        });
    }
    Ok(minor)
}

/// Convert gateway minor units back to a major-unit amount.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}
