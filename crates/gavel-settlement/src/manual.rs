//! Operator-triggered settlement of a winner's deposit.
//!
//! Both actions start from the user's `succeeded` deposit Payment for the
//! auction and write a new record row (`forfeit` or `refund`) pointing back
//! at it through `related_payment`.
//!
//! A refund runs in three steps because the gateway call cannot be part of
//! a store transaction: stage the `refund` row and mark the deposit as
//! having a refund in flight, call the gateway, then release the reserved
//! funds. The gateway's own `charge.refunded` event may land before the last
//! step; it completes the staged refund through `complete_refund_in` and
//! the last step then finds the work done.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use gavel_ledger::payments::{find_settled_deposit_in, transition_in};
use gavel_ledger::wallet_ledger::{self, MoveContext};
use gavel_ledger::{Document, DocumentStore, Transaction, run_transaction};
use gavel_types::money::{round_money, to_minor_units};
use gavel_types::{
    AuctionId, Caller, Payment, PaymentId, PaymentStatus, PaymentType, PlatformRevenueEvent,
    RefundRef, Result, RevenueKind, SettlementConfig, SettlementError, UserId, WalletBucket,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::gateway::PaymentGateway;

/// Which way to settle the deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    Forfeit,
    Refund,
}

impl FromStr for ManualAction {
    type Err = SettlementError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "forfeit" => Ok(Self::Forfeit),
            "refund" => Ok(Self::Refund),
            other => Err(SettlementError::InvalidInput {
                reason: format!("action must be forfeit or refund, got {other:?}"),
            }),
        }
    }
}

impl fmt::Display for ManualAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forfeit => write!(f, "forfeit"),
            Self::Refund => write!(f, "refund"),
        }
    }
}

/// Operator request to settle a deposit by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSettlementRequest {
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub action: ManualAction,
    pub amount: Decimal,
}

/// Result returned to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSettlement {
    /// `forfeited` or `refunded`.
    pub status: PaymentStatus,
    /// The new record row.
    pub payment_id: PaymentId,
    pub refund_id: Option<RefundRef>,
    /// Amount actually moved out of `reserved`.
    pub amount: Decimal,
}

pub fn forfeit_or_refund(
    store: &dyn DocumentStore,
    gateway: &dyn PaymentGateway,
    config: &SettlementConfig,
    caller: &Caller,
    request: &ManualSettlementRequest,
    now: DateTime<Utc>,
) -> Result<ManualSettlement> {
    if !caller.is_admin() {
        return Err(SettlementError::PermissionDenied {
            reason: "Admin access required".into(),
        });
    }
    let amount = round_money(request.amount);
    if amount <= Decimal::ZERO {
        return Err(SettlementError::InvalidAmount {
            reason: format!("amount must be positive, got {}", request.amount),
        });
    }

    let deposit = find_settled_deposit_in(
        &mut Transaction::new(store),
        request.user_id,
        request.auction_id,
    )?
    .ok_or(SettlementError::SettledDepositNotFound {
        auction_id: request.auction_id,
        user_id: request.user_id,
    })?;

    let result = match request.action {
        ManualAction::Forfeit => forfeit(store, config, &deposit, amount, now)?,
        ManualAction::Refund => refund(store, gateway, config, &deposit, amount, now)?,
    };
    info!(
        auction_id = %request.auction_id,
        user_id = %request.user_id,
        action = %request.action,
        amount = %result.amount,
        operator = %caller.user_id,
        "manual settlement applied"
    );
    Ok(result)
}

/// Re-read the deposit inside `tx`; it must still be `succeeded` with no
/// refund in flight.
fn settled_deposit_in(tx: &mut Transaction<'_>, id: PaymentId) -> Result<Payment> {
    let deposit = tx
        .payment(id)?
        .ok_or_else(|| SettlementError::PaymentNotFound(id.to_string()))?;
    if deposit.status != PaymentStatus::Succeeded {
        return Err(SettlementError::IllegalTransition {
            entity: "payment",
            from: deposit.status.to_string(),
            to: "settled by operator".into(),
        });
    }
    if let Some(row) = deposit.pending_refund {
        return Err(SettlementError::IllegalTransition {
            entity: "payment",
            from: format!("succeeded with refund {row} in flight"),
            to: "settled by operator".into(),
        });
    }
    Ok(deposit)
}

fn record_row(deposit: &Payment, kind: PaymentType, amount: Decimal, now: DateTime<Utc>) -> Result<Payment> {
    let mut row = Payment::new(
        deposit.user_id,
        kind,
        deposit.auction_id,
        amount,
        deposit.currency.clone(),
        now,
    );
    row.related_payment = Some(deposit.id);
    row.transition(PaymentStatus::Succeeded, now)?;
    Ok(row)
}

fn forfeit(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    deposit: &Payment,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<ManualSettlement> {
    run_transaction(store, &config.retry, "manual.forfeit", |tx| {
        let original = settled_deposit_in(tx, deposit.id)?;
        let ctx = MoveContext::payment(original.id, original.auction_id);
        let moved = wallet_ledger::forfeit_in(tx, original.user_id, amount, ctx, now)?;

        let row = record_row(&original, PaymentType::Forfeit, moved, now)?;
        if let Some(auction_id) = original.auction_id {
            tx.append_revenue(PlatformRevenueEvent::new(
                auction_id,
                original.user_id,
                RevenueKind::Forfeit,
                moved,
                original.currency.clone(),
                Some(original.id),
                now,
            ))?;
        }
        transition_in(tx, original, PaymentStatus::Forfeited, now)?;
        let payment_id = row.id;
        tx.create(Document::Payment(row))?;

        Ok(ManualSettlement {
            status: PaymentStatus::Forfeited,
            payment_id,
            refund_id: None,
            amount: moved,
        })
    })
}

fn refund(
    store: &dyn DocumentStore,
    gateway: &dyn PaymentGateway,
    config: &SettlementConfig,
    deposit: &Payment,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<ManualSettlement> {
    let intent_ref = deposit
        .gateway_ref
        .clone()
        .ok_or_else(|| SettlementError::InvalidInput {
            reason: format!("deposit {} has no gateway reference", deposit.id),
        })?;
    let amount_minor = to_minor_units(amount)?;

    let row_id = run_transaction(store, &config.retry, "manual.refund.stage", |tx| {
        let mut original = settled_deposit_in(tx, deposit.id)?;
        // Funds are checked before money leaves through the gateway.
        let wallet = tx.wallet(original.user_id)?;
        if wallet.reserved < amount {
            return Err(SettlementError::InsufficientFunds {
                bucket: WalletBucket::Reserved,
                needed: amount,
                available: wallet.reserved,
            });
        }
        let mut row = Payment::new(
            original.user_id,
            PaymentType::Refund,
            original.auction_id,
            amount,
            original.currency.clone(),
            now,
        );
        row.related_payment = Some(original.id);
        original.pending_refund = Some(row.id);
        original.updated_at = now;
        let row_id = row.id;
        tx.put_payment(original);
        tx.create(Document::Payment(row))?;
        Ok(row_id)
    })?;

    let issued = gateway.retrieve_intent(&intent_ref).and_then(|intent| {
        let charge = intent.latest_charge.ok_or_else(|| SettlementError::Gateway {
            reason: format!("intent {intent_ref} has no captured charge"),
        })?;
        gateway.refund(&charge, amount_minor)
    });
    let refund_id = match issued {
        Ok(refund_id) => refund_id,
        Err(err) => {
            if let Err(abort_err) = abort_refund(store, config, deposit.id, row_id, now) {
                error!(
                    deposit_id = %deposit.id,
                    refund_row = %row_id,
                    error = %abort_err,
                    "gateway refund failed and the staged refund could not be withdrawn"
                );
            }
            return Err(err);
        }
    };

    let applied = run_transaction(store, &config.retry, "manual.refund.finish", |tx| {
        complete_refund_in(tx, deposit.id, row_id, Some(&refund_id), now)
    });
    if let Err(err) = &applied {
        error!(
            deposit_id = %deposit.id,
            refund_id = %refund_id,
            error = %err,
            "gateway refund issued but ledger update failed"
        );
    }
    applied
}

/// Withdraw a staged refund the gateway never issued.
fn abort_refund(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    deposit_id: PaymentId,
    row_id: PaymentId,
    now: DateTime<Utc>,
) -> Result<()> {
    run_transaction(store, &config.retry, "manual.refund.abort", |tx| {
        if let Some(row) = tx.payment(row_id)? {
            if row.status == PaymentStatus::Created {
                transition_in(tx, row, PaymentStatus::Failed, now)?;
            }
        }
        if let Some(mut original) = tx.payment(deposit_id)? {
            if original.pending_refund == Some(row_id) {
                original.pending_refund = None;
                original.updated_at = now;
                tx.put_payment(original);
            }
        }
        Ok(())
    })
}

/// Finish a staged operator refund: reserved→available, the `refund` row
/// `succeeded`, the deposit `refunded`. Runs from the operator call once the
/// gateway answers, or from the gateway's refund event if that lands first;
/// whichever runs second finds the row settled and changes nothing.
pub(crate) fn complete_refund_in(
    tx: &mut Transaction<'_>,
    deposit_id: PaymentId,
    row_id: PaymentId,
    refund: Option<&RefundRef>,
    now: DateTime<Utc>,
) -> Result<ManualSettlement> {
    let mut row = tx
        .payment(row_id)?
        .ok_or_else(|| SettlementError::PaymentNotFound(row_id.to_string()))?;
    if row.status == PaymentStatus::Succeeded {
        if row.refund_ref.is_none() && refund.is_some() {
            row.refund_ref = refund.cloned();
            tx.put_payment(row.clone());
        }
        return Ok(ManualSettlement {
            status: PaymentStatus::Refunded,
            payment_id: row.id,
            refund_id: row.refund_ref,
            amount: row.amount,
        });
    }

    let mut original = tx
        .payment(deposit_id)?
        .ok_or_else(|| SettlementError::PaymentNotFound(deposit_id.to_string()))?;
    if original.pending_refund != Some(row_id) {
        return Err(SettlementError::ConsistencyViolation {
            reason: format!("refund {row_id} is not staged on deposit {deposit_id}"),
        });
    }

    let ctx = MoveContext::payment(original.id, original.auction_id);
    wallet_ledger::release_in(tx, original.user_id, row.amount, ctx, now)?;

    row.refund_ref = refund.cloned();
    let row = transition_in(tx, row, PaymentStatus::Succeeded, now)?;
    original.pending_refund = None;
    if original.refund_ref.is_none() {
        original.refund_ref = refund.cloned();
    }
    transition_in(tx, original, PaymentStatus::Refunded, now)?;

    Ok(ManualSettlement {
        status: PaymentStatus::Refunded,
        payment_id: row.id,
        refund_id: row.refund_ref,
        amount: row.amount,
    })
}
