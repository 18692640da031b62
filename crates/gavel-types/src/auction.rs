//! Auction documents and their lifecycle states.
//!
//! ## State Machine
//!
//! ```text
//!   DRAFT ──▶ APPROVED_AWAITING_PAYMENT ──fee paid──▶ ACTIVE
//!                                                       │ close
//!                                                       ▼
//!                                                     ENDED ──deadline, winner silent──▶ ENDED_NO_RESPONSE
//! ```
//!
//! Transitions are **monotonic**: an auction never moves backward. The
//! settlement fields are written once, at the transition that owns them,
//! and are frozen afterwards.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AuctionId, PaymentId, UserId};

/// Lifecycle state of an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionState {
    Draft,
    ApprovedAwaitingPayment,
    Active,
    Ended,
    EndedNoResponse,
}

impl AuctionState {
    /// Position along the lifecycle; later states rank higher.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::ApprovedAwaitingPayment => 1,
            Self::Active => 2,
            Self::Ended => 3,
            Self::EndedNoResponse => 4,
        }
    }

    /// Whether this state is `target` or lies beyond it.
    #[must_use]
    pub fn is_at_or_past(self, target: Self) -> bool {
        self.rank() >= target.rank()
    }

    /// Can an auction in this state move directly to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::ApprovedAwaitingPayment)
                | (Self::ApprovedAwaitingPayment, Self::Active)
                | (Self::Active, Self::Ended)
                | (Self::Ended, Self::EndedNoResponse)
        )
    }
}

impl fmt::Display for AuctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::ApprovedAwaitingPayment => write!(f, "APPROVED_AWAITING_PAYMENT"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Ended => write!(f, "ENDED"),
            Self::EndedNoResponse => write!(f, "ENDED_NO_RESPONSE"),
        }
    }
}

/// Outcome of the deposit hold taken at close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    #[default]
    None,
    Held,
    Waived,
    Insufficient,
    Forfeited,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Held => write!(f, "held"),
            Self::Waived => write!(f, "waived"),
            Self::Insufficient => write!(f, "insufficient"),
            Self::Forfeited => write!(f, "forfeited"),
        }
    }
}

/// Which party a commission payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionSide {
    Buyer,
    Seller,
}

/// Combined commission state of both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    #[default]
    None,
    BuyerPaid,
    SellerPaid,
    Paid,
    Forfeited,
}

impl CommissionStatus {
    /// Status implied by the two paid flags. `Forfeited` is sticky.
    #[must_use]
    pub fn recompute(self, buyer_paid: bool, seller_paid: bool) -> Self {
        if self == Self::Forfeited {
            return Self::Forfeited;
        }
        match (buyer_paid, seller_paid) {
            (true, true) => Self::Paid,
            (true, false) => Self::BuyerPaid,
            (false, true) => Self::SellerPaid,
            (false, false) => Self::None,
        }
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::BuyerPaid => write!(f, "buyer_paid"),
            Self::SellerPaid => write!(f, "seller_paid"),
            Self::Paid => write!(f, "paid"),
            Self::Forfeited => write!(f, "forfeited"),
        }
    }
}

/// One listed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: AuctionId,
    pub seller_id: Option<UserId>,
    pub state: AuctionState,

    // --- Pricing ---
    pub start_price: Decimal,
    pub reserve_price: Option<Decimal>,
    /// Monotonically non-decreasing while `ACTIVE`.
    pub current_price: Decimal,
    pub ends_at: DateTime<Utc>,

    // --- Winner linkage ---
    pub current_winner_id: Option<UserId>,
    pub final_price: Option<Decimal>,
    #[serde(default)]
    pub buyer_confirmed_purchase: bool,

    // --- Listing fee ---
    #[serde(default)]
    pub listing_fee_paid: bool,
    pub listing_fee_payment_id: Option<PaymentId>,
    pub activated_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    // --- Deposit (written once at close) ---
    pub deposit_required: Option<Decimal>,
    pub deposit_held: Option<Decimal>,
    #[serde(default)]
    pub deposit_status: DepositStatus,
    pub winner_deadline_at: Option<DateTime<Utc>>,
    pub winner_deadline_hours: Option<u32>,

    // --- Forfeiture (written once at deadline enforcement) ---
    pub forfeit_amount: Option<Decimal>,
    pub forfeited_at: Option<DateTime<Utc>>,

    // --- Commission ---
    #[serde(default)]
    pub buyer_commission_paid: bool,
    pub buyer_commission_payment_id: Option<PaymentId>,
    pub buyer_commission_paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seller_commission_paid: bool,
    pub seller_commission_payment_id: Option<PaymentId>,
    pub seller_commission_paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commission_status: CommissionStatus,
    #[serde(default)]
    pub winner_contact_released: bool,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Auction {
    /// A listing that has not been submitted yet.
    #[must_use]
    pub fn draft(
        seller_id: UserId,
        start_price: Decimal,
        reserve_price: Option<Decimal>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuctionId::new(),
            seller_id: Some(seller_id),
            state: AuctionState::Draft,
            start_price,
            reserve_price,
            current_price: start_price,
            ends_at,
            current_winner_id: None,
            final_price: None,
            buyer_confirmed_purchase: false,
            listing_fee_paid: false,
            listing_fee_payment_id: None,
            activated_at: None,
            ended_at: None,
            deposit_required: None,
            deposit_held: None,
            deposit_status: DepositStatus::None,
            winner_deadline_at: None,
            winner_deadline_hours: None,
            forfeit_amount: None,
            forfeited_at: None,
            buyer_commission_paid: false,
            buyer_commission_payment_id: None,
            buyer_commission_paid_at: None,
            seller_commission_paid: false,
            seller_commission_payment_id: None,
            seller_commission_paid_at: None,
            commission_status: CommissionStatus::None,
            winner_contact_released: false,
            updated_at: None,
        }
    }

    /// Price the forfeiture is sized from: the final price if recorded,
    /// otherwise the current price.
    #[must_use]
    pub fn settlement_price(&self) -> Decimal {
        self.final_price.unwrap_or(self.current_price)
    }

    /// Whether the given side's commission has been recorded.
    #[must_use]
    pub fn commission_paid(&self, side: CommissionSide) -> bool {
        match side {
            CommissionSide::Buyer => self.buyer_commission_paid,
            CommissionSide::Seller => self.seller_commission_paid,
        }
    }

    /// Record one side's commission and recompute the combined status.
    /// Returns `false` (and changes nothing) if that side was already paid.
    pub fn record_commission(
        &mut self,
        side: CommissionSide,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> bool {
        if self.commission_paid(side) {
            return false;
        }
        match side {
            CommissionSide::Buyer => {
                self.buyer_commission_paid = true;
                self.buyer_commission_payment_id = Some(payment_id);
                self.buyer_commission_paid_at = Some(now);
            }
            CommissionSide::Seller => {
                self.seller_commission_paid = true;
                self.seller_commission_payment_id = Some(payment_id);
                self.seller_commission_paid_at = Some(now);
            }
        }
        self.commission_status = self
            .commission_status
            .recompute(self.buyer_commission_paid, self.seller_commission_paid);
        self.updated_at = Some(now);
        true
    }
}

/// Fixture constructors for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Auction {
    /// An `ACTIVE` auction with the given price, winner and end time.
    pub fn dummy_active(
        current_price: Decimal,
        winner: Option<UserId>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        let mut auction = Self::draft(UserId::new(), current_price, None, ends_at);
        auction.state = AuctionState::Active;
        auction.listing_fee_paid = true;
        auction.current_winner_id = winner;
        auction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        assert!(AuctionState::ApprovedAwaitingPayment.can_transition_to(AuctionState::Active));
        assert!(AuctionState::Active.can_transition_to(AuctionState::Ended));
        assert!(AuctionState::Ended.can_transition_to(AuctionState::EndedNoResponse));
    }

    #[test]
    fn state_transitions_never_go_backward() {
        assert!(!AuctionState::Ended.can_transition_to(AuctionState::Active));
        assert!(!AuctionState::EndedNoResponse.can_transition_to(AuctionState::Ended));
        assert!(!AuctionState::Active.can_transition_to(AuctionState::EndedNoResponse));
    }

    #[test]
    fn at_or_past() {
        assert!(AuctionState::Ended.is_at_or_past(AuctionState::Ended));
        assert!(AuctionState::EndedNoResponse.is_at_or_past(AuctionState::Ended));
        assert!(!AuctionState::Active.is_at_or_past(AuctionState::Ended));
    }

    #[test]
    fn commission_status_convergence() {
        let s = CommissionStatus::None;
        assert_eq!(s.recompute(true, false), CommissionStatus::BuyerPaid);
        assert_eq!(s.recompute(false, true), CommissionStatus::SellerPaid);
        assert_eq!(s.recompute(true, true), CommissionStatus::Paid);
        assert_eq!(
            CommissionStatus::Forfeited.recompute(true, true),
            CommissionStatus::Forfeited
        );
    }

    #[test]
    fn record_commission_once_per_side() {
        let mut auction = Auction::dummy_active(Decimal::new(100, 0), None, Utc::now());
        let payment = PaymentId::new();
        assert!(auction.record_commission(CommissionSide::Seller, payment, Utc::now()));
        assert_eq!(auction.commission_status, CommissionStatus::SellerPaid);
        assert!(!auction.record_commission(CommissionSide::Seller, PaymentId::new(), Utc::now()));
        assert_eq!(auction.seller_commission_payment_id, Some(payment));

        assert!(auction.record_commission(CommissionSide::Buyer, PaymentId::new(), Utc::now()));
        assert_eq!(auction.commission_status, CommissionStatus::Paid);
    }

    #[test]
    fn settlement_price_prefers_final() {
        let mut auction = Auction::dummy_active(Decimal::new(100, 0), None, Utc::now());
        assert_eq!(auction.settlement_price(), Decimal::new(100, 0));
        auction.final_price = Some(Decimal::new(90, 0));
        assert_eq!(auction.settlement_price(), Decimal::new(90, 0));
    }

    #[test]
    fn state_serde_uses_persisted_names() {
        let json = serde_json::to_string(&AuctionState::ApprovedAwaitingPayment).unwrap();
        assert_eq!(json, "\"APPROVED_AWAITING_PAYMENT\"");
        let json = serde_json::to_string(&CommissionStatus::BuyerPaid).unwrap();
        assert_eq!(json, "\"buyer_paid\"");
        let back: AuctionState = serde_json::from_str("\"ENDED_NO_RESPONSE\"").unwrap();
        assert_eq!(back, AuctionState::EndedNoResponse);
    }
}
