//! Winner-deadline enforcement.
//!
//! An `ENDED` auction whose winner neither confirmed the purchase nor
//! responded by `winnerDeadlineAt` forfeits the reserved deposit. The
//! forfeiture, the revenue record and the move to `ENDED_NO_RESPONSE`
//! commit as one transaction.

use chrono::{DateTime, Utc};
use gavel_ledger::wallet_ledger::{self, MoveContext};
use gavel_ledger::{DocumentStore, Transaction, run_transaction};
use gavel_types::{
    AuctionId, AuctionState, CommissionStatus, DepositStatus, PlatformRevenueEvent, Result,
    RevenueKind, SettlementConfig,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::lifecycle;

/// What enforcement did to one auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// Deposit forfeited; `moved` may be below `requested` when the wallet
    /// held less.
    Forfeited { requested: Decimal, moved: Decimal },
    /// Ended without a winner; nothing to forfeit.
    NoWinner,
    /// The buyer confirmed the purchase in time.
    BuyerConfirmed,
    /// Deadline not reached, or the auction is not `ENDED`.
    NotDue,
    /// Already forfeited by an earlier run.
    AlreadyForfeited,
}

impl DeadlineOutcome {
    #[must_use]
    pub fn advanced(self) -> bool {
        matches!(self, Self::Forfeited { .. })
    }
}

pub fn enforce_in(
    tx: &mut Transaction<'_>,
    config: &SettlementConfig,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<DeadlineOutcome> {
    let mut auction = tx.require_auction(auction_id)?;

    if auction.deposit_status == DepositStatus::Forfeited
        || auction.state == AuctionState::EndedNoResponse
    {
        return Ok(DeadlineOutcome::AlreadyForfeited);
    }
    if auction.state != AuctionState::Ended {
        return Ok(DeadlineOutcome::NotDue);
    }
    if auction.buyer_confirmed_purchase {
        return Ok(DeadlineOutcome::BuyerConfirmed);
    }
    if auction.winner_deadline_at.is_none_or(|at| at > now) {
        return Ok(DeadlineOutcome::NotDue);
    }
    let Some(winner) = auction.current_winner_id else {
        return Ok(DeadlineOutcome::NoWinner);
    };

    let price = auction.settlement_price();
    let requested = config.forfeit_rules.charge(price);
    let moved = if requested.is_zero() {
        Decimal::ZERO
    } else {
        wallet_ledger::forfeit_in(tx, winner, requested, MoveContext::auction(auction_id), now)?
    };
    if moved < requested {
        warn!(%auction_id, %winner, %requested, %moved, "forfeit capped at reserved balance");
    }

    tx.append_revenue(PlatformRevenueEvent::new(
        auction_id,
        winner,
        RevenueKind::Forfeit,
        moved,
        config.default_currency.clone(),
        None,
        now,
    ))?;

    lifecycle::advance(&mut auction, AuctionState::EndedNoResponse, now)?;
    auction.deposit_status = DepositStatus::Forfeited;
    auction.commission_status = CommissionStatus::Forfeited;
    auction.winner_contact_released = false;
    auction.forfeit_amount = Some(moved);
    auction.forfeited_at = Some(now);
    tx.put_auction(auction);

    Ok(DeadlineOutcome::Forfeited { requested, moved })
}

/// Enforce the deadline of one auction in its own transaction.
pub fn enforce_deadline(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<DeadlineOutcome> {
    let outcome = run_transaction(store, &config.retry, "auction.deadline", |tx| {
        enforce_in(tx, config, auction_id, now)
    })?;
    match outcome {
        DeadlineOutcome::Forfeited { requested, moved } => {
            info!(%auction_id, %requested, %moved, "winner deadline passed, deposit forfeited");
        }
        other => debug!(%auction_id, outcome = ?other, "deadline skipped"),
    }
    Ok(outcome)
}
