//! Wallet documents and their bucket arithmetic.
//!
//! Every user has three non-negative buckets:
//! - `available`: free to be reserved as an auction deposit,
//! - `reserved`: held against an auction the user won,
//! - `locked`: held by operator action outside the engine's moves.
//!
//! A fund unit sits in exactly one bucket. The methods here check
//! sufficiency *before* mutating, so a failed move leaves the wallet
//! untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AuctionId, LedgerEntryId, PaymentId, Result, SettlementError, UserId, WalletBucket,
};

/// Per-user balance record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: UserId,
    pub available: Decimal,
    pub reserved: Decimal,
    pub locked: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// A zero wallet, created lazily on first settlement touch.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            available: Decimal::ZERO,
            reserved: Decimal::ZERO,
            locked: Decimal::ZERO,
            updated_at: None,
        }
    }

    /// Total balance across all buckets.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.reserved + self.locked
    }

    /// Whether every bucket is non-negative.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.available.is_sign_negative()
            && !self.reserved.is_sign_negative()
            && !self.locked.is_sign_negative()
    }

    /// available → reserved.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if `available < amount`.
    pub fn reserve(&mut self, amount: Decimal) -> Result<()> {
        check_amount(amount)?;
        if self.available < amount {
            return Err(SettlementError::InsufficientFunds {
                bucket: WalletBucket::Available,
                needed: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.reserved += amount;
        Ok(())
    }

    /// reserved → available.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if `reserved < amount`.
    pub fn release_to_available(&mut self, amount: Decimal) -> Result<()> {
        check_amount(amount)?;
        if self.reserved < amount {
            return Err(SettlementError::InsufficientFunds {
                bucket: WalletBucket::Reserved,
                needed: amount,
                available: self.reserved,
            });
        }
        self.reserved -= amount;
        self.available += amount;
        Ok(())
    }

    /// reserved → platform. Moves `min(amount, reserved)` and returns the
    /// amount actually moved; never errors on a short reserve.
    ///
    /// # Errors
    /// Returns `InvalidAmount` if `amount` is negative.
    pub fn forfeit(&mut self, amount: Decimal) -> Result<Decimal> {
        check_amount(amount)?;
        let take = amount.min(self.reserved).max(Decimal::ZERO);
        self.reserved -= take;
        Ok(take)
    }

    /// Pure increment of `available`.
    ///
    /// # Errors
    /// Returns `InvalidAmount` if `amount` is negative.
    pub fn credit_available(&mut self, amount: Decimal) -> Result<()> {
        check_amount(amount)?;
        self.available += amount;
        Ok(())
    }
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SettlementError::InvalidAmount {
            reason: format!("wallet moves take non-negative amounts, got {amount}"),
        });
    }
    Ok(())
}

/// The four ledger moves a wallet can undergo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMove {
    /// Outside money in: available += amount.
    Credit,
    /// available → reserved.
    Reserve,
    /// reserved → available.
    Release,
    /// reserved → platform revenue.
    Forfeit,
}

impl std::fmt::Display for LedgerMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Reserve => write!(f, "RESERVE"),
            Self::Release => write!(f, "RELEASE"),
            Self::Forfeit => write!(f, "FORFEIT"),
        }
    }
}

/// Append-only journal entry written alongside every wallet move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub kind: LedgerMove,
    /// Amount actually moved (for forfeits, possibly less than requested).
    pub amount: Decimal,
    pub auction_id: Option<AuctionId>,
    pub payment_id: Option<PaymentId>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Net effect of this entry on the wallet's total balance.
    #[must_use]
    pub fn total_delta(&self) -> Decimal {
        match self.kind {
            LedgerMove::Credit => self.amount,
            LedgerMove::Forfeit => -self.amount,
            LedgerMove::Reserve | LedgerMove::Release => Decimal::ZERO,
        }
    }
}
