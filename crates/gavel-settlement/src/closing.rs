//! Auction closing: end an `ACTIVE` auction whose end time has passed and
//! attach the winner's deposit outcome.
//!
//! The auction update and the deposit reservation commit together. The
//! delivery contract is created afterwards in its own create-if-absent
//! transaction, so a crash between the two leaves an ended auction whose
//! contract is created on the next close attempt.

use chrono::{DateTime, Utc};
use gavel_ledger::wallet_ledger::{self, MoveContext};
use gavel_ledger::{Document, DocumentStore, Transaction, run_transaction};
use gavel_types::constants::CONTRACT_VERSION;
use gavel_types::{
    Auction, AuctionId, AuctionState, Contract, DepositStatus, Result, SettlementConfig, UserId,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::lifecycle::{self, Guard};

/// What closing did to one auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Ended without a winner; no deposit logic.
    NoWinner,
    /// Ended and `required` was reserved from the winner's wallet.
    Held { required: Decimal },
    /// Ended; the winner is exempt from deposits.
    Waived { required: Decimal },
    /// Ended; the winner could not cover the deposit.
    Insufficient { required: Decimal },
    /// Already ended by an earlier run.
    AlreadyClosed,
    /// Not eligible: still running, or never went live.
    NotDue,
}

impl CloseOutcome {
    /// Whether this run moved the auction to `ENDED`.
    #[must_use]
    pub fn advanced(self) -> bool {
        !matches!(self, Self::AlreadyClosed | Self::NotDue)
    }
}

/// Parties of the delivery contract, known once the auction has ended.
type Parties = Option<(UserId, UserId)>;

fn parties(auction: &Auction) -> Parties {
    auction.seller_id.zip(auction.current_winner_id)
}

/// Close one auction inside `tx`. Returns the outcome and, when both seller
/// and winner are known, the contract parties.
pub fn close_in(
    tx: &mut Transaction<'_>,
    config: &SettlementConfig,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<(CloseOutcome, Parties)> {
    let mut auction = tx.require_auction(auction_id)?;

    if auction.state != AuctionState::Active || auction.ends_at > now {
        let outcome = match lifecycle::guard(&auction, AuctionState::Ended) {
            Ok(Guard::AlreadyThere) => CloseOutcome::AlreadyClosed,
            _ => CloseOutcome::NotDue,
        };
        let contract = if outcome == CloseOutcome::AlreadyClosed {
            parties(&auction)
        } else {
            None
        };
        return Ok((outcome, contract));
    }

    let Some(winner) = auction.current_winner_id else {
        lifecycle::advance(&mut auction, AuctionState::Ended, now)?;
        auction.ended_at = Some(now);
        tx.put_auction(auction);
        return Ok((CloseOutcome::NoWinner, None));
    };

    let price = auction.current_price;
    let required = config.deposit_rules.charge(price);

    if !tx.has_wallet(winner)? {
        let mut wallet = tx.wallet(winner)?;
        wallet.updated_at = Some(now);
        tx.put_wallet(wallet);
    }

    let waived = tx
        .user_profile(winner)?
        .is_some_and(|profile| profile.vip_deposit_waived);

    let outcome = if waived {
        CloseOutcome::Waived { required }
    } else if required.is_zero() {
        CloseOutcome::Held { required }
    } else if tx.wallet(winner)?.available >= required {
        wallet_ledger::reserve_in(tx, winner, required, MoveContext::auction(auction_id), now)?;
        CloseOutcome::Held { required }
    } else {
        CloseOutcome::Insufficient { required }
    };

    let (status, held) = match outcome {
        CloseOutcome::Held { required } => (DepositStatus::Held, required),
        CloseOutcome::Waived { .. } => (DepositStatus::Waived, Decimal::ZERO),
        _ => (DepositStatus::Insufficient, Decimal::ZERO),
    };

    lifecycle::advance(&mut auction, AuctionState::Ended, now)?;
    auction.ended_at = Some(now);
    auction.final_price = Some(price);
    auction.deposit_required = Some(required);
    auction.deposit_held = Some(held);
    auction.deposit_status = status;
    auction.winner_deadline_hours = Some(config.winner_deadline_hours);
    auction.winner_deadline_at = Some(auction.ends_at + config.winner_deadline());

    let contract = parties(&auction);
    tx.put_auction(auction);
    Ok((outcome, contract))
}

/// Create the delivery contract if none exists. Returns whether one was
/// created.
pub fn ensure_contract(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    auction_id: AuctionId,
    seller_id: UserId,
    buyer_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool> {
    let created = run_transaction(store, &config.retry, "contract.create", |tx| {
        tx.create(Document::Contract(Contract {
            auction_id,
            seller_id,
            buyer_id,
            terms_accepted_seller: false,
            terms_accepted_buyer: false,
            contract_version: CONTRACT_VERSION.to_string(),
            created_at: now,
        }))
    })?;
    if created {
        info!(%auction_id, %seller_id, %buyer_id, "delivery contract created");
    } else {
        debug!(%auction_id, "delivery contract already present");
    }
    Ok(created)
}

/// Close one auction end to end: the guarded transaction, then the contract.
pub fn close_auction(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<CloseOutcome> {
    let (outcome, contract) = run_transaction(store, &config.retry, "auction.close", |tx| {
        close_in(tx, config, auction_id, now)
    })?;

    match outcome {
        CloseOutcome::NoWinner => info!(%auction_id, "auction ended without a winner"),
        CloseOutcome::Held { required } => {
            info!(%auction_id, %required, "auction ended, deposit held");
        }
        CloseOutcome::Waived { required } => {
            info!(%auction_id, %required, "auction ended, deposit waived");
        }
        CloseOutcome::Insufficient { required } => {
            info!(%auction_id, %required, "auction ended, winner deposit insufficient");
        }
        CloseOutcome::AlreadyClosed | CloseOutcome::NotDue => {
            debug!(%auction_id, ?outcome, "close skipped");
        }
    }

    if let Some((seller, buyer)) = contract {
        ensure_contract(store, config, auction_id, seller, buyer, now)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use gavel_ledger::{MemoryStore, WalletLedger};
    use gavel_types::{RetryPolicy, Tier, TierSchedule};

    use super::*;

    fn setup(rules: TierSchedule) -> (Arc<MemoryStore>, SettlementConfig) {
        let config = SettlementConfig {
            deposit_rules: rules,
            retry: RetryPolicy::immediate(3),
            ..SettlementConfig::default()
        };
        (Arc::new(MemoryStore::new()), config)
    }

    fn seed(store: &MemoryStore, price: i64, winner: Option<UserId>) -> Auction {
        let auction = Auction::dummy_active(
            Decimal::new(price, 0),
            winner,
            Utc::now() - Duration::minutes(1),
        );
        store.seed([Document::Auction(auction.clone())]).unwrap();
        auction
    }

    #[test]
    fn unmatched_tier_holds_zero() {
        let (store, config) = setup(TierSchedule::default());
        let winner = UserId::new();
        let auction = seed(&store, 6000, Some(winner));

        let outcome = close_auction(store.as_ref(), &config, auction.id, Utc::now()).unwrap();
        assert_eq!(outcome, CloseOutcome::Held { required: Decimal::ZERO });

        let mut tx = Transaction::new(store.as_ref());
        let closed = tx.require_auction(auction.id).unwrap();
        assert_eq!(closed.deposit_status, DepositStatus::Held);
        assert_eq!(closed.deposit_held, Some(Decimal::ZERO));
        // The winner gets a wallet even though nothing moved; the seller is
        // untouched by closing.
        assert!(tx.has_wallet(winner).unwrap());
        assert!(!tx.has_wallet(auction.seller_id.unwrap()).unwrap());
    }

    #[test]
    fn reservation_and_state_change_commit_together() {
        let rules = TierSchedule::new(vec![Tier::unbounded(Decimal::ZERO, Decimal::new(10, 2))]);
        let (store, config) = setup(rules);
        let winner = UserId::new();
        WalletLedger::new(store.clone(), config.retry)
            .credit_available(winner, Decimal::new(100, 0), Utc::now())
            .unwrap();
        let auction = seed(&store, 1000, Some(winner));
        let now = Utc::now();

        let mut tx = Transaction::new(store.as_ref());
        let (outcome, parties) = close_in(&mut tx, &config, auction.id, now).unwrap();
        assert_eq!(outcome, CloseOutcome::Held { required: Decimal::new(100, 0) });
        assert_eq!(parties, Some((auction.seller_id.unwrap(), winner)));
        // Nothing is visible until commit.
        assert_eq!(
            Transaction::new(store.as_ref()).wallet(winner).unwrap().reserved,
            Decimal::ZERO
        );
        tx.commit().unwrap();
        assert_eq!(
            Transaction::new(store.as_ref()).wallet(winner).unwrap().reserved,
            Decimal::new(100, 0)
        );
    }

    #[test]
    fn contract_is_created_once() {
        let (store, config) = setup(TierSchedule::default());
        let (auction, seller, buyer) = (AuctionId::new(), UserId::new(), UserId::new());
        let now = Utc::now();
        assert!(ensure_contract(store.as_ref(), &config, auction, seller, buyer, now).unwrap());
        assert!(!ensure_contract(store.as_ref(), &config, auction, seller, buyer, now).unwrap());
        let contract = Transaction::new(store.as_ref()).contract(auction).unwrap().unwrap();
        assert_eq!(contract.contract_version, CONTRACT_VERSION);
    }

    #[test]
    fn missing_auction_is_not_found() {
        let (store, config) = setup(TierSchedule::default());
        let err = close_auction(store.as_ref(), &config, AuctionId::new(), Utc::now()).unwrap_err();
        assert_eq!(err.category(), gavel_types::ErrorCategory::NotFound);
    }
}
