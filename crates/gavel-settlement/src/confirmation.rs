//! Gateway-driven payment confirmation.
//!
//! Events arrive at least once and in any order. Every handler re-reads the
//! Payment inside its transaction and keys off its persisted status, so a
//! redelivered event finds the work already done and returns
//! [`Confirmation::Duplicate`]. On success the status flip and the
//! type-specific effect commit together.

use chrono::{DateTime, Utc};
use gavel_ledger::payments::{find_by_gateway_ref_in, locate_in, transition_in};
use gavel_ledger::wallet_ledger::{self, MoveContext};
use gavel_ledger::{DocumentStore, Transaction, run_transaction};
use gavel_types::money::{from_minor_units, to_minor_units};
use gavel_types::{
    AuctionId, ChargeMetadata, CommissionSide, CommissionStatus, GatewayEvent, GatewayRef,
    Payment, PaymentId, PaymentStatus, PaymentType, PlatformRevenueEvent, RefundRef, Result,
    RevenueKind, SettlementConfig, SettlementError,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::lifecycle::{self, ListingOutcome};
use crate::manual;

/// What applying one gateway event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The payment moved to `status` and its effect was applied.
    Applied {
        payment_id: PaymentId,
        kind: PaymentType,
        status: PaymentStatus,
    },
    /// The payment was already in the state this event implies.
    Duplicate { payment_id: PaymentId },
    /// The event arrived after the payment moved on; nothing changed.
    Stale {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// No payment row matches the event.
    Unattributed,
    /// Event type with no settlement meaning.
    Ignored { kind: String },
}

/// Apply one decoded gateway event.
pub fn apply_event(
    store: &dyn DocumentStore,
    config: &SettlementConfig,
    event: &GatewayEvent,
    now: DateTime<Utc>,
) -> Result<Confirmation> {
    let outcome = match event {
        GatewayEvent::ChargeSucceeded {
            intent,
            amount_minor,
            metadata,
            ..
        } => run_transaction(store, &config.retry, "payment.succeeded", |tx| {
            on_success_in(tx, intent, *amount_minor, metadata, now)
        })?,
        GatewayEvent::ChargeFailed { intent } => {
            run_transaction(store, &config.retry, "payment.failed", |tx| {
                on_failure_in(tx, intent, now)
            })?
        }
        GatewayEvent::ChargeRefunded {
            intent,
            amount_refunded_minor,
            refund,
            ..
        } => run_transaction(store, &config.retry, "payment.refunded", |tx| {
            on_refund_in(tx, intent, *amount_refunded_minor, refund.as_ref(), now)
        })?,
        GatewayEvent::Unrecognized { kind } => Confirmation::Ignored { kind: kind.clone() },
    };

    match &outcome {
        Confirmation::Applied {
            payment_id,
            kind,
            status,
        } => info!(%payment_id, %kind, %status, event = event.label(), "payment event applied"),
        Confirmation::Unattributed => {
            warn!(event = event.label(), "gateway event matches no payment, dropped");
        }
        Confirmation::Stale { payment_id, status } => {
            warn!(%payment_id, %status, event = event.label(), "stale gateway event ignored");
        }
        Confirmation::Duplicate { payment_id } => {
            debug!(%payment_id, event = event.label(), "duplicate gateway event");
        }
        Confirmation::Ignored { kind } => debug!(%kind, "unrecognized gateway event ignored"),
    }
    Ok(outcome)
}

fn on_success_in(
    tx: &mut Transaction<'_>,
    intent: &GatewayRef,
    amount_minor: i64,
    metadata: &ChargeMetadata,
    now: DateTime<Utc>,
) -> Result<Confirmation> {
    let Some(mut payment) = locate_in(tx, metadata.payment_id, intent)? else {
        return Ok(Confirmation::Unattributed);
    };
    match payment.status {
        PaymentStatus::Succeeded => {
            return Ok(Confirmation::Duplicate {
                payment_id: payment.id,
            });
        }
        PaymentStatus::Refunded | PaymentStatus::Forfeited => {
            return Ok(Confirmation::Stale {
                payment_id: payment.id,
                status: payment.status,
            });
        }
        PaymentStatus::Created | PaymentStatus::Failed => {}
    }

    let charged = from_minor_units(amount_minor);
    if to_minor_units(payment.amount).ok() != Some(amount_minor) {
        warn!(
            payment_id = %payment.id,
            recorded = %payment.amount,
            %charged,
            "charged amount differs from payment row, settling the charged amount"
        );
    }

    if payment.gateway_ref.is_none() {
        payment.gateway_ref = Some(intent.clone());
    }
    let payment = transition_in(tx, payment, PaymentStatus::Succeeded, now)?;
    apply_success_effect_in(tx, &payment, charged, now)?;

    Ok(Confirmation::Applied {
        payment_id: payment.id,
        kind: payment.kind,
        status: PaymentStatus::Succeeded,
    })
}

/// The type-specific effect of a succeeded payment. `charged` is the amount
/// the gateway reports, in major units.
fn apply_success_effect_in(
    tx: &mut Transaction<'_>,
    payment: &Payment,
    charged: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    let ctx = MoveContext::payment(payment.id, payment.auction_id);
    match payment.kind {
        PaymentType::Deposit => {
            if charged > Decimal::ZERO {
                wallet_ledger::credit_in(tx, payment.user_id, charged, ctx, now)?;
            } else {
                warn!(payment_id = %payment.id, %charged, "deposit charge carries no amount");
            }
        }
        PaymentType::ListingFee => confirm_listing_fee_in(tx, payment, now)?,
        PaymentType::BuyerCommission => {
            record_commission_in(tx, payment, CommissionSide::Buyer, charged, now)?;
        }
        PaymentType::SellerCommission => {
            record_commission_in(tx, payment, CommissionSide::Seller, charged, now)?;
        }
        PaymentType::Forfeit | PaymentType::Refund => {
            warn!(payment_id = %payment.id, kind = %payment.kind, "record-only payment confirmed by gateway");
        }
    }
    Ok(())
}

/// Activate the auction a listing fee pays for. A fee whose auction is
/// unknown or gone is still recorded as paid.
fn confirm_listing_fee_in(
    tx: &mut Transaction<'_>,
    payment: &Payment,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(auction_id) = payment.auction_id else {
        warn!(payment_id = %payment.id, "listing fee names no auction, nothing to activate");
        return Ok(());
    };
    match lifecycle::confirm_listing_fee_in(tx, auction_id, payment.id, now) {
        Ok(ListingOutcome::AlreadyPaid) => {
            warn!(%auction_id, payment_id = %payment.id, "listing fee paid twice");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(SettlementError::AuctionNotFound(_)) => {
            warn!(%auction_id, payment_id = %payment.id, "listing fee for missing auction");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn require_auction_link(payment: &Payment) -> Result<AuctionId> {
    payment.auction_id.ok_or_else(|| SettlementError::InvalidInput {
        reason: format!("{} payment {} has no auction", payment.kind, payment.id),
    })
}

/// Flag the commission side (first payment only) and book the revenue of
/// every paying Payment. Revenue ids key on the Payment, so redelivery of
/// one event books it once.
fn record_commission_in(
    tx: &mut Transaction<'_>,
    payment: &Payment,
    side: CommissionSide,
    charged: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    let auction_id = require_auction_link(payment)?;
    let mut auction = tx.require_auction(auction_id)?;
    let first = auction.record_commission(side, payment.id, now);
    if !first {
        warn!(%auction_id, ?side, payment_id = %payment.id, "commission side already paid, booking revenue only");
    }

    let (kind, user_id) = match side {
        CommissionSide::Buyer => (RevenueKind::BuyerCommission, payment.user_id),
        CommissionSide::Seller => (
            RevenueKind::SellerCommission,
            auction.seller_id.unwrap_or(payment.user_id),
        ),
    };
    tx.append_revenue(PlatformRevenueEvent::new(
        auction_id,
        user_id,
        kind,
        charged,
        payment.currency.clone(),
        Some(payment.id),
        now,
    ))?;

    if !first {
        return Ok(());
    }
    if side == CommissionSide::Buyer {
        if auction.commission_status == CommissionStatus::Forfeited {
            warn!(%auction_id, "buyer commission after forfeiture, contact stays withheld");
        } else {
            auction.winner_contact_released = true;
        }
    }
    tx.put_auction(auction);
    Ok(())
}

fn on_failure_in(
    tx: &mut Transaction<'_>,
    intent: &GatewayRef,
    now: DateTime<Utc>,
) -> Result<Confirmation> {
    let Some(payment) = find_by_gateway_ref_in(tx, intent)? else {
        return Ok(Confirmation::Unattributed);
    };
    match payment.status {
        PaymentStatus::Created => {
            let payment = transition_in(tx, payment, PaymentStatus::Failed, now)?;
            Ok(Confirmation::Applied {
                payment_id: payment.id,
                kind: payment.kind,
                status: PaymentStatus::Failed,
            })
        }
        PaymentStatus::Failed => Ok(Confirmation::Duplicate {
            payment_id: payment.id,
        }),
        status => Ok(Confirmation::Stale {
            payment_id: payment.id,
            status,
        }),
    }
}

fn on_refund_in(
    tx: &mut Transaction<'_>,
    intent: &GatewayRef,
    amount_refunded_minor: i64,
    refund: Option<&RefundRef>,
    now: DateTime<Utc>,
) -> Result<Confirmation> {
    let Some(mut payment) = find_by_gateway_ref_in(tx, intent)? else {
        return Ok(Confirmation::Unattributed);
    };
    match payment.status {
        PaymentStatus::Refunded => {
            return Ok(Confirmation::Duplicate {
                payment_id: payment.id,
            });
        }
        PaymentStatus::Forfeited => {
            return Ok(Confirmation::Stale {
                payment_id: payment.id,
                status: payment.status,
            });
        }
        // Redelivered by the gateway once the success event has landed.
        PaymentStatus::Created | PaymentStatus::Failed => {
            return Err(SettlementError::PaymentNotSettled(payment.id));
        }
        PaymentStatus::Succeeded => {}
    }

    // An operator refund staged this one; finish it instead of crediting.
    if let Some(row_id) = payment.pending_refund {
        let settled = manual::complete_refund_in(tx, payment.id, row_id, refund, now)?;
        debug!(payment_id = %payment.id, refund_row = %settled.payment_id, "operator refund completed by gateway event");
        return Ok(Confirmation::Applied {
            payment_id: payment.id,
            kind: payment.kind,
            status: PaymentStatus::Refunded,
        });
    }

    if payment.refund_ref.is_none() {
        payment.refund_ref = refund.cloned();
    }
    let payment = transition_in(tx, payment, PaymentStatus::Refunded, now)?;

    if payment.kind == PaymentType::Deposit {
        let refunded = from_minor_units(amount_refunded_minor);
        if refunded > Decimal::ZERO {
            let ctx = MoveContext::payment(payment.id, payment.auction_id);
            wallet_ledger::credit_in(tx, payment.user_id, refunded, ctx, now)?;
        }
    }

    Ok(Confirmation::Applied {
        payment_id: payment.id,
        kind: payment.kind,
        status: PaymentStatus::Refunded,
    })
}
