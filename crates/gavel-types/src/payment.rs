//! Payment records: one row per attempted charge or monetary event.
//!
//! ## Status machine
//!
//! ```text
//!   ┌─────────┐ success ┌───────────┐ refund  ┌──────────┐
//!   │ CREATED ├────────▶│ SUCCEEDED ├────────▶│ REFUNDED │
//!   └───┬─────┘         └─────┬─────┘         └──────────┘
//!       │ failure        ▲    │ forfeit       ┌───────────┐
//!       ▼                │    └──────────────▶│ FORFEITED │
//!   ┌────────┐  success  │                    └───────────┘
//!   │ FAILED ├───────────┘
//!   └────────┘
//! ```
//!
//! A failed charge may still succeed on a later gateway retry of the same
//! intent. `REFUNDED` and `FORFEITED` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, GatewayRef, PaymentId, RefundRef, Result, SettlementError, UserId};

/// What a payment row pays for. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Wallet top-up.
    Deposit,
    /// Fee that activates an approved listing.
    ListingFee,
    /// Buyer's share of the sale commission.
    BuyerCommission,
    /// Seller's share of the sale commission.
    SellerCommission,
    /// Record of a manual forfeiture.
    Forfeit,
    /// Record of a manual refund.
    Refund,
}

impl PaymentType {
    /// Whether users may open a gateway charge for this type.
    #[must_use]
    pub fn is_chargeable(self) -> bool {
        matches!(
            self,
            Self::Deposit | Self::ListingFee | Self::BuyerCommission | Self::SellerCommission
        )
    }

    /// Whether a charge of this type must name an auction.
    #[must_use]
    pub fn requires_auction(self) -> bool {
        matches!(self, Self::BuyerCommission | Self::SellerCommission)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::ListingFee => "listing_fee",
            Self::BuyerCommission => "buyer_commission",
            Self::SellerCommission => "seller_commission",
            Self::Forfeit => "forfeit",
            Self::Refund => "refund",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = SettlementError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "deposit" => Ok(Self::Deposit),
            "listing_fee" => Ok(Self::ListingFee),
            "buyer_commission" => Ok(Self::BuyerCommission),
            "seller_commission" => Ok(Self::SellerCommission),
            "forfeit" => Ok(Self::Forfeit),
            "refund" => Ok(Self::Refund),
            other => Err(SettlementError::InvalidPaymentType(other.to_string())),
        }
    }
}

/// Lifecycle status of a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Succeeded,
    Failed,
    Forfeited,
    Refunded,
}

impl PaymentStatus {
    /// Can a payment in this status move to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Succeeded | Self::Failed)
                | (Self::Failed, Self::Succeeded)
                | (Self::Succeeded, Self::Refunded | Self::Forfeited)
        )
    }

    /// No further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Refunded | Self::Forfeited)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Forfeited => write!(f, "forfeited"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// One row per attempted charge or monetary event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    /// Owner of the payment.
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub auction_id: Option<AuctionId>,
    /// Major units. Immutable after creation.
    pub amount: Decimal,
    pub currency: String,
    /// Gateway charge intent this row is correlated with.
    pub gateway_ref: Option<GatewayRef>,
    pub status: PaymentStatus,
    /// Original payment a forfeit/refund record points back at.
    pub related_payment: Option<PaymentId>,
    pub refund_ref: Option<RefundRef>,
    /// Operator refund row staged against this payment while the gateway
    /// refund is in flight.
    #[serde(default)]
    pub pending_refund: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A fresh `created` row.
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: PaymentType,
        auction_id: Option<AuctionId>,
        amount: Decimal,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            user_id,
            kind,
            auction_id,
            amount,
            currency: currency.into(),
            gateway_ref: None,
            status: PaymentStatus::Created,
            related_payment: None,
            refund_ref: None,
            pending_refund: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, enforcing the status machine.
    ///
    /// # Errors
    /// Returns [`SettlementError::IllegalTransition`] if the move is not allowed.
    pub fn transition(&mut self, target: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(SettlementError::IllegalTransition {
                entity: "payment",
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}
