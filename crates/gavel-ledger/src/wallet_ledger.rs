//! Wallet Ledger: the four moves a wallet can undergo.
//!
//! Each move reads one wallet, checks sufficiency, writes the wallet back
//! and appends a [`LedgerEntry`] journal record, all inside the caller's
//! transaction. The `*_in` functions compose into larger transactions (an
//! auction close reserves funds in the same commit that ends the auction);
//! the methods on [`WalletLedger`] run a move as its own transaction.
//!
//! The ledger performs no deduplication. A wallet document alone cannot tell
//! a retry from a second legitimate charge, so idempotency belongs to the
//! orchestrator's state guards.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_types::{
    AuctionId, LedgerEntry, LedgerEntryId, LedgerMove, PaymentId, Result, RetryPolicy,
    SettlementError, UserId, Wallet,
};
use rust_decimal::Decimal;
use tracing::{debug, error};

use crate::store::DocumentStore;
use crate::transaction::{Transaction, run_transaction};

/// What a wallet move is about, recorded on its journal entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveContext {
    pub auction_id: Option<AuctionId>,
    pub payment_id: Option<PaymentId>,
}

impl MoveContext {
    #[must_use]
    pub fn auction(auction_id: AuctionId) -> Self {
        Self {
            auction_id: Some(auction_id),
            payment_id: None,
        }
    }

    #[must_use]
    pub fn payment(payment_id: PaymentId, auction_id: Option<AuctionId>) -> Self {
        Self {
            auction_id,
            payment_id: Some(payment_id),
        }
    }
}

/// available → reserved.
///
/// # Errors
/// `InsufficientFunds` if `available < amount`; the wallet is untouched.
pub fn reserve_in(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    amount: Decimal,
    ctx: MoveContext,
    now: DateTime<Utc>,
) -> Result<()> {
    apply(tx, user_id, LedgerMove::Reserve, ctx, now, |w| {
        w.reserve(amount).map(|()| amount)
    })
    .map(|_| ())
}

/// reserved → available.
///
/// # Errors
/// `InsufficientFunds` if `reserved < amount`; the wallet is untouched.
pub fn release_in(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    amount: Decimal,
    ctx: MoveContext,
    now: DateTime<Utc>,
) -> Result<()> {
    apply(tx, user_id, LedgerMove::Release, ctx, now, |w| {
        w.release_to_available(amount).map(|()| amount)
    })
    .map(|_| ())
}

/// reserved → platform. Moves `min(amount, reserved)` and returns the
/// amount actually moved, which is what the journal records.
pub fn forfeit_in(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    amount: Decimal,
    ctx: MoveContext,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    apply(tx, user_id, LedgerMove::Forfeit, ctx, now, |w| w.forfeit(amount))
}

/// Outside money in: available += amount.
pub fn credit_in(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    amount: Decimal,
    ctx: MoveContext,
    now: DateTime<Utc>,
) -> Result<()> {
    apply(tx, user_id, LedgerMove::Credit, ctx, now, |w| {
        w.credit_available(amount).map(|()| amount)
    })
    .map(|_| ())
}

fn apply(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    kind: LedgerMove,
    ctx: MoveContext,
    now: DateTime<Utc>,
    mutate: impl FnOnce(&mut Wallet) -> Result<Decimal>,
) -> Result<Decimal> {
    let mut wallet = tx.wallet(user_id)?;
    let moved = mutate(&mut wallet)?;

    if !wallet.is_well_formed() {
        error!(%user_id, %kind, %moved, "wallet bucket went negative");
        return Err(SettlementError::ConsistencyViolation {
            reason: format!("{kind} left wallet {user_id} with a negative bucket"),
        });
    }

    wallet.updated_at = Some(now);
    tx.put_wallet(wallet);
    tx.append_journal(LedgerEntry {
        id: LedgerEntryId::new(),
        user_id,
        kind,
        amount: moved,
        auction_id: ctx.auction_id,
        payment_id: ctx.payment_id,
        recorded_at: now,
    });
    debug!(%user_id, %kind, %moved, "wallet move staged");
    Ok(moved)
}

/// Standalone wallet moves, each in its own transaction.
pub struct WalletLedger {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl WalletLedger {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Current wallet, or a zero wallet if the user has none yet.
    pub fn balance(&self, user_id: UserId) -> Result<Wallet> {
        Transaction::new(self.store.as_ref()).wallet(user_id)
    }

    pub fn reserve(&self, user_id: UserId, amount: Decimal, now: DateTime<Utc>) -> Result<()> {
        run_transaction(self.store.as_ref(), &self.retry, "wallet.reserve", |tx| {
            reserve_in(tx, user_id, amount, MoveContext::default(), now)
        })
    }

    pub fn release_to_available(
        &self,
        user_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        run_transaction(self.store.as_ref(), &self.retry, "wallet.release", |tx| {
            release_in(tx, user_id, amount, MoveContext::default(), now)
        })
    }

    pub fn forfeit(&self, user_id: UserId, amount: Decimal, now: DateTime<Utc>) -> Result<Decimal> {
        run_transaction(self.store.as_ref(), &self.retry, "wallet.forfeit", |tx| {
            forfeit_in(tx, user_id, amount, MoveContext::default(), now)
        })
    }

    pub fn credit_available(
        &self,
        user_id: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        run_transaction(self.store.as_ref(), &self.retry, "wallet.credit", |tx| {
            credit_in(tx, user_id, amount, MoveContext::default(), now)
        })
    }
}
