//! Charge intents: the user-facing start of every gateway payment.

use chrono::{DateTime, Utc};
use gavel_ledger::PaymentRecords;
use gavel_types::money::{round_money, to_minor_units};
use gavel_types::{
    AuctionId, Caller, ChargeMetadata, GatewayRef, Payment, PaymentId, PaymentStatus,
    PaymentType, Result, SettlementConfig, SettlementError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gateway::{IntentRequest, PaymentGateway};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeIntentRequest {
    /// Payment type tag, e.g. `deposit`.
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub auction_id: Option<AuctionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeIntentResponse {
    pub client_secret: String,
    pub payment_id: PaymentId,
}

/// Validate the request, write a `created` Payment row, then open the
/// gateway intent with the row id in its metadata.
///
/// # Errors
/// Validation errors leave no trace. A gateway failure marks the row
/// `failed` and is returned as-is.
pub fn create_charge_intent(
    records: &PaymentRecords,
    gateway: &dyn PaymentGateway,
    config: &SettlementConfig,
    caller: &Caller,
    request: &ChargeIntentRequest,
    now: DateTime<Utc>,
) -> Result<ChargeIntentResponse> {
    let kind: PaymentType = request.kind.trim().parse()?;
    if !kind.is_chargeable() {
        return Err(SettlementError::InvalidPaymentType(request.kind.clone()));
    }
    if kind.requires_auction() && request.auction_id.is_none() {
        return Err(SettlementError::InvalidInput {
            reason: format!("auctionId is required for {kind}"),
        });
    }
    let amount = round_money(request.amount);
    let amount_minor = to_minor_units(amount)?;
    let currency = request
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(&config.default_currency)
        .to_lowercase();

    let payment = Payment::new(caller.user_id, kind, request.auction_id, amount, currency.clone(), now);
    records.create(&payment)?;

    let intent_request = IntentRequest {
        amount_minor,
        currency,
        metadata: ChargeMetadata {
            payment_id: Some(payment.id),
            user_id: Some(caller.user_id),
            kind: Some(kind),
            auction_id: request.auction_id,
        },
    };
    let intent = match gateway.create_intent(&intent_request) {
        Ok(intent) => intent,
        Err(err) => {
            warn!(payment_id = %payment.id, error = %err, "gateway refused charge intent");
            if let Err(mark) = records.set_status(payment.id, PaymentStatus::Failed, now) {
                warn!(payment_id = %payment.id, error = %mark, "could not mark payment failed");
            }
            return Err(err);
        }
    };

    records.attach_gateway_ref(payment.id, &intent.id, now)?;
    info!(payment_id = %payment.id, %kind, %amount, gateway_ref = %intent.id, "charge intent created");

    Ok(ChargeIntentResponse {
        client_secret: intent.client_secret,
        payment_id: payment.id,
    })
}

/// Link a payment row to a gateway intent the client created or confirmed.
/// Only the payment's owner may do this, and an existing link is kept.
/// Returns whether the link was written.
pub fn confirm_association(
    records: &PaymentRecords,
    caller: &Caller,
    payment_id: PaymentId,
    gateway_ref: &GatewayRef,
    now: DateTime<Utc>,
) -> Result<bool> {
    if gateway_ref.as_str().trim().is_empty() {
        return Err(SettlementError::InvalidInput {
            reason: "gateway reference is required".into(),
        });
    }
    let payment = records.require(payment_id)?;
    if payment.user_id != caller.user_id {
        return Err(SettlementError::PermissionDenied {
            reason: format!("payment {payment_id} belongs to another user"),
        });
    }
    records.attach_gateway_ref(payment_id, gateway_ref, now)
}
