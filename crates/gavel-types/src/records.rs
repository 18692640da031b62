//! Append-once records and user-facing side documents: platform revenue,
//! delivery contracts, user profiles, and the caller identity handed in by
//! the RPC layer.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, PaymentId, RevenueEventId, UserId};

/// What kind of money the platform captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueKind {
    BuyerCommission,
    SellerCommission,
    Forfeit,
}

impl RevenueKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuyerCommission => "buyer_commission",
            Self::SellerCommission => "seller_commission",
            Self::Forfeit => "forfeit",
        }
    }

    /// Accounting source bucket: `commission` or `forfeit`.
    #[must_use]
    pub fn source(self) -> &'static str {
        match self {
            Self::BuyerCommission | Self::SellerCommission => "commission",
            Self::Forfeit => "forfeit",
        }
    }
}

impl fmt::Display for RevenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of money captured by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRevenueEvent {
    pub id: RevenueEventId,
    pub auction_id: AuctionId,
    /// User the money was captured from.
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: RevenueKind,
    /// Payment that produced the revenue, when there is one.
    pub source_payment: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

impl PlatformRevenueEvent {
    /// Build an event whose id is derived from (auction, kind, source payment).
    #[must_use]
    pub fn new(
        auction_id: AuctionId,
        user_id: UserId,
        kind: RevenueKind,
        amount: Decimal,
        currency: impl Into<String>,
        source_payment: Option<PaymentId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RevenueEventId::deterministic(auction_id, kind.as_str(), source_payment),
            auction_id,
            user_id,
            amount,
            currency: currency.into(),
            kind,
            source_payment,
            created_at: now,
        }
    }
}

/// Delivery contract between seller and winner, keyed by auction id.
/// Fields are frozen at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub auction_id: AuctionId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub terms_accepted_seller: bool,
    pub terms_accepted_buyer: bool,
    pub contract_version: String,
    pub created_at: DateTime<Utc>,
}

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Settlement-relevant slice of a user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub role: Role,
    /// VIP bidders win without a deposit hold.
    #[serde(default)]
    pub vip_deposit_waived: bool,
}

/// Authenticated identity supplied by the RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
