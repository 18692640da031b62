//! The settlement engine: one service object wiring the store, the gateway
//! and the configuration into the sweeps, the webhook path and the operator
//! operations.
//!
//! Sweeps process each candidate auction in its own transaction. A failure
//! on one auction is logged and counted, and the sweep moves on; committed
//! work stands and unprocessed auctions are picked up by the next tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_ledger::{DocKey, DocumentStore, PaymentRecords, Query};
use gavel_types::{
    AuctionId, Caller, GatewayRef, PaymentId, Result, SettlementConfig, SettlementError,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::closing::{self, CloseOutcome};
use crate::confirmation::{self, Confirmation};
use crate::deadline::{self, DeadlineOutcome};
use crate::gateway::PaymentGateway;
use crate::intents::{self, ChargeIntentRequest, ChargeIntentResponse};
use crate::manual::{self, ManualSettlement, ManualSettlementRequest};
use crate::webhook::WebhookVerifier;

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates returned by the store query.
    pub examined: usize,
    /// Candidates this sweep moved forward.
    pub advanced: usize,
    /// Candidates found already handled or not yet due.
    pub skipped: usize,
    /// Candidates whose transaction failed.
    pub failed: usize,
}

impl SweepReport {
    fn record<T>(&mut self, outcome: &Result<T>, advanced: impl Fn(&T) -> bool) {
        match outcome {
            Ok(value) if advanced(value) => self.advanced += 1,
            Ok(_) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct SettlementEngine {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: SettlementConfig,
    verifier: WebhookVerifier,
    payments: PaymentRecords,
}

impl SettlementEngine {
    /// Build an engine after validating `config`.
    ///
    /// # Errors
    /// [`SettlementError::Configuration`] if the configuration is unusable.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: SettlementConfig,
    ) -> Result<Self> {
        config.validate()?;
        let verifier = WebhookVerifier::new(&config.webhook);
        let payments = PaymentRecords::new(store.clone(), config.retry);
        Ok(Self {
            store,
            gateway,
            config,
            verifier,
            payments,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentRecords {
        &self.payments
    }

    // ---------------------------------------------------------------------
    // Sweeps
    // ---------------------------------------------------------------------

    /// Close every `ACTIVE` auction whose end time is at or before `now`.
    ///
    /// # Errors
    /// Only if the candidate query itself fails; per-auction failures are
    /// counted in the report.
    pub fn close_due_auctions(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.candidates(&Query::AuctionsDueForClose { now })?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };
        for auction_id in candidates {
            let outcome = self.close_auction(auction_id, now);
            if let Err(err) = &outcome {
                log_item_failure("close", auction_id, err);
            }
            report.record(&outcome, |o| o.advanced());
        }
        info!(sweep = "close", ?report, "sweep finished");
        Ok(report)
    }

    /// Close one auction. A no-op if it is already closed or not yet due.
    pub fn close_auction(&self, auction_id: AuctionId, now: DateTime<Utc>) -> Result<CloseOutcome> {
        closing::close_auction(self.store.as_ref(), &self.config, auction_id, now)
    }

    /// Forfeit deposits of every `ENDED` auction whose winner deadline has
    /// passed without a buyer confirmation.
    ///
    /// # Errors
    /// Only if the candidate query itself fails.
    pub fn enforce_deadlines(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.candidates(&Query::AuctionsPastDeadline { now })?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };
        for auction_id in candidates {
            let outcome = self.enforce_deadline(auction_id, now);
            if let Err(err) = &outcome {
                log_item_failure("deadline", auction_id, err);
            }
            report.record(&outcome, |o| o.advanced());
        }
        info!(sweep = "deadline", ?report, "sweep finished");
        Ok(report)
    }

    pub fn enforce_deadline(
        &self,
        auction_id: AuctionId,
        now: DateTime<Utc>,
    ) -> Result<DeadlineOutcome> {
        deadline::enforce_deadline(self.store.as_ref(), &self.config, auction_id, now)
    }

    fn candidates(&self, query: &Query) -> Result<Vec<AuctionId>> {
        Ok(self
            .store
            .query(query)?
            .into_iter()
            .filter_map(|key| match key {
                DocKey::Auction(id) => Some(id),
                _ => None,
            })
            .collect())
    }

    // ---------------------------------------------------------------------
    // Gateway events
    // ---------------------------------------------------------------------

    /// Verify, decode and apply one webhook delivery.
    ///
    /// # Errors
    /// Signature and decoding failures are validation errors (the ingester
    /// answers with a client error). Retryable errors ask the gateway to
    /// redeliver.
    pub fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<Confirmation> {
        let envelope = self
            .verifier
            .verify_and_decode(payload, signature_header, now)
            .inspect_err(|err| warn!(error = %err, "webhook rejected"))?;
        info!(event_id = %envelope.id, event = envelope.event.label(), "webhook received");
        confirmation::apply_event(self.store.as_ref(), &self.config, &envelope.event, now)
    }

    // ---------------------------------------------------------------------
    // Operator operations
    // ---------------------------------------------------------------------

    pub fn create_charge_intent(
        &self,
        caller: &Caller,
        request: &ChargeIntentRequest,
        now: DateTime<Utc>,
    ) -> Result<ChargeIntentResponse> {
        intents::create_charge_intent(
            &self.payments,
            self.gateway.as_ref(),
            &self.config,
            caller,
            request,
            now,
        )
    }

    pub fn confirm_association(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
        gateway_ref: &GatewayRef,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        intents::confirm_association(&self.payments, caller, payment_id, gateway_ref, now)
    }

    pub fn forfeit_or_refund(
        &self,
        caller: &Caller,
        request: &ManualSettlementRequest,
        now: DateTime<Utc>,
    ) -> Result<ManualSettlement> {
        manual::forfeit_or_refund(
            self.store.as_ref(),
            self.gateway.as_ref(),
            &self.config,
            caller,
            request,
            now,
        )
    }
}

fn log_item_failure(sweep: &str, auction_id: AuctionId, err: &SettlementError) {
    match err {
        SettlementError::ConsistencyViolation { .. } | SettlementError::IllegalTransition { .. } => {
            error!(sweep, %auction_id, error = %err, "consistency violation, auction skipped");
        }
        SettlementError::AuctionNotFound(_) => {
            warn!(sweep, %auction_id, "auction vanished, skipped");
        }
        _ => warn!(sweep, %auction_id, error = %err, "auction failed, will retry next tick"),
    }
}
