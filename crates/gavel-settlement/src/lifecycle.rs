//! Auction Lifecycle State Machine.
//!
//! Every transition goes through [`guard`]: if the persisted state is
//! already at or past the target, the transition is a successful no-op.
//! Repeated sweeps and redelivered events therefore converge instead of
//! double-applying.

use chrono::{DateTime, Utc};
use gavel_ledger::Transaction;
use gavel_types::{Auction, AuctionId, AuctionState, PaymentId, Result, SettlementError};
use tracing::info;

/// Result of asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The transition may proceed.
    Proceed,
    /// The auction is already at or past the target; do nothing.
    AlreadyThere,
}

/// Check whether `auction` may move to `target`.
///
/// # Errors
/// [`SettlementError::IllegalTransition`] if the auction is behind the
/// target but cannot reach it in one step (e.g. `DRAFT` → `ENDED`).
pub fn guard(auction: &Auction, target: AuctionState) -> Result<Guard> {
    if auction.state.is_at_or_past(target) {
        return Ok(Guard::AlreadyThere);
    }
    if !auction.state.can_transition_to(target) {
        return Err(SettlementError::IllegalTransition {
            entity: "auction",
            from: auction.state.to_string(),
            to: target.to_string(),
        });
    }
    Ok(Guard::Proceed)
}

/// Apply a guarded transition in memory. Returns `false` if it was a no-op.
pub fn advance(auction: &mut Auction, target: AuctionState, now: DateTime<Utc>) -> Result<bool> {
    match guard(auction, target)? {
        Guard::AlreadyThere => Ok(false),
        Guard::Proceed => {
            auction.state = target;
            auction.updated_at = Some(now);
            Ok(true)
        }
    }
}

/// What a listing-fee confirmation did to the auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOutcome {
    /// Fee recorded and the auction went live.
    Activated,
    /// Fee recorded; the auction was not awaiting payment.
    Recorded,
    /// The fee was already recorded.
    AlreadyPaid,
}

/// Record a paid listing fee and, if the auction was awaiting it, move it
/// from `APPROVED_AWAITING_PAYMENT` to `ACTIVE`.
pub fn confirm_listing_fee_in(
    tx: &mut Transaction<'_>,
    auction_id: AuctionId,
    payment_id: PaymentId,
    now: DateTime<Utc>,
) -> Result<ListingOutcome> {
    let mut auction = tx.require_auction(auction_id)?;
    if auction.listing_fee_paid {
        return Ok(ListingOutcome::AlreadyPaid);
    }

    auction.listing_fee_paid = true;
    auction.listing_fee_payment_id = Some(payment_id);
    auction.updated_at = Some(now);

    let outcome = if auction.state == AuctionState::ApprovedAwaitingPayment {
        advance(&mut auction, AuctionState::Active, now)?;
        auction.activated_at = Some(now);
        info!(%auction_id, "listing fee paid, auction active");
        ListingOutcome::Activated
    } else {
        ListingOutcome::Recorded
    };
    tx.put_auction(auction);
    Ok(outcome)
}
