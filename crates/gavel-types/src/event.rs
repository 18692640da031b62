//! Payment-gateway events as a closed tagged union.
//!
//! The gateway delivers JSON envelopes of the form
//! `{"id": "...", "type": "<tag>", "data": {"object": {...}}}`. Only three
//! tags carry settlement meaning; every other tag decodes to
//! [`GatewayEvent::Unrecognized`] so new gateway event kinds are accepted
//! and ignored rather than rejected.

use std::collections::BTreeMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AuctionId, ChargeRef, GatewayRef, PaymentId, PaymentType, RefundRef, Result, SettlementError,
    UserId,
};

/// Tag of a successful charge.
pub const CHARGE_SUCCEEDED: &str = "payment_intent.succeeded";
/// Tag of a failed charge.
pub const CHARGE_FAILED: &str = "payment_intent.payment_failed";
/// Tag of a (full or partial) refund.
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// Correlation data embedded in every charge we create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeMetadata {
    pub payment_id: Option<PaymentId>,
    pub user_id: Option<UserId>,
    pub kind: Option<PaymentType>,
    pub auction_id: Option<AuctionId>,
}

impl ChargeMetadata {
    const PAYMENT_ID: &'static str = "paymentId";
    const USER_ID: &'static str = "uid";
    const KIND: &'static str = "type";
    const AUCTION_ID: &'static str = "auctionId";

    /// Flatten into the string map the gateway stores. Absent values are
    /// written as empty strings.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            Self::PAYMENT_ID.to_string(),
            self.payment_id.map(|id| id.0.to_string()).unwrap_or_default(),
        );
        map.insert(
            Self::USER_ID.to_string(),
            self.user_id.map(|id| id.0.to_string()).unwrap_or_default(),
        );
        map.insert(
            Self::KIND.to_string(),
            self.kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
        );
        map.insert(
            Self::AUCTION_ID.to_string(),
            self.auction_id.map(|id| id.0.to_string()).unwrap_or_default(),
        );
        map
    }

    /// Parse the gateway's string map. Missing, empty or malformed values
    /// become `None`; metadata is advisory and never fails decoding.
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let uuid = |key: &str| {
            map.get(key)
                .map(|raw| raw.trim())
                .filter(|raw| !raw.is_empty())
                .and_then(|raw| Uuid::parse_str(raw).ok())
        };
        Self {
            payment_id: uuid(Self::PAYMENT_ID).map(PaymentId),
            user_id: uuid(Self::USER_ID).map(UserId),
            kind: map.get(Self::KIND).and_then(|raw| raw.parse().ok()),
            auction_id: uuid(Self::AUCTION_ID).map(AuctionId),
        }
    }
}

/// A decoded gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    ChargeSucceeded {
        intent: GatewayRef,
        amount_minor: i64,
        currency: String,
        metadata: ChargeMetadata,
    },
    ChargeFailed {
        intent: GatewayRef,
    },
    ChargeRefunded {
        charge: ChargeRef,
        intent: GatewayRef,
        amount_refunded_minor: i64,
        /// Most recent refund on the charge, when the gateway lists it.
        refund: Option<RefundRef>,
    },
    Unrecognized {
        kind: String,
    },
}

impl GatewayEvent {
    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::ChargeSucceeded { .. } => CHARGE_SUCCEEDED,
            Self::ChargeFailed { .. } => CHARGE_FAILED,
            Self::ChargeRefunded { .. } => CHARGE_REFUNDED,
            Self::Unrecognized { kind } => kind,
        }
    }
}

/// Event plus the gateway's event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub id: String,
    pub event: GatewayEvent,
}

#[derive(Deserialize)]
struct RawEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawIntent {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawCharge {
    id: String,
    payment_intent: String,
    #[serde(default)]
    amount_refunded: i64,
    #[serde(default)]
    refunds: Option<RawList>,
}

#[derive(Deserialize)]
struct RawList {
    #[serde(default)]
    data: Vec<RawRefund>,
}

#[derive(Deserialize)]
struct RawRefund {
    id: String,
}

impl GatewayEnvelope {
    /// Decode a raw (already signature-verified) payload.
    ///
    /// # Errors
    /// Returns [`SettlementError::MalformedEvent`] if the envelope or the
    /// object of a recognized event type does not have the expected shape.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_slice(payload).map_err(malformed)?;
        let event = match raw.kind.as_str() {
            CHARGE_SUCCEEDED => {
                let intent: RawIntent = serde_json::from_value(raw.data.object).map_err(malformed)?;
                GatewayEvent::ChargeSucceeded {
                    intent: GatewayRef(intent.id),
                    amount_minor: intent.amount,
                    currency: intent.currency,
                    metadata: ChargeMetadata::from_map(&intent.metadata),
                }
            }
            CHARGE_FAILED => {
                let intent: RawIntent = serde_json::from_value(raw.data.object).map_err(malformed)?;
                GatewayEvent::ChargeFailed {
                    intent: GatewayRef(intent.id),
                }
            }
            CHARGE_REFUNDED => {
                let charge: RawCharge = serde_json::from_value(raw.data.object).map_err(malformed)?;
                GatewayEvent::ChargeRefunded {
                    charge: ChargeRef(charge.id),
                    intent: GatewayRef(charge.payment_intent),
                    amount_refunded_minor: charge.amount_refunded,
                    refund: charge
                        .refunds
                        .and_then(|list| list.data.into_iter().next())
                        .map(|r| RefundRef(r.id)),
                }
            }
            _ => GatewayEvent::Unrecognized { kind: raw.kind },
        };
        Ok(Self { id: raw.id, event })
    }
}

fn malformed(err: serde_json::Error) -> SettlementError {
    SettlementError::MalformedEvent {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_map_roundtrip() {
        let meta = ChargeMetadata {
            payment_id: Some(PaymentId::new()),
            user_id: Some(UserId::new()),
            kind: Some(PaymentType::BuyerCommission),
            auction_id: None,
        };
        let map = meta.to_map();
        assert_eq!(map.get("auctionId").map(String::as_str), Some(""));
        assert_eq!(ChargeMetadata::from_map(&map), meta);
    }

    #[test]
    fn decodes_succeeded() {
        let payment = PaymentId::new();
        let payload = format!(
            r#"{{"id":"evt_1","type":"payment_intent.succeeded","data":{{"object":{{
                "id":"pi_1","amount":48000,"currency":"aed",
                "metadata":{{"paymentId":"{}","type":"deposit"}}}}}}}}"#,
            payment.0
        );
        let env = GatewayEnvelope::decode(payload.as_bytes()).unwrap();
        assert_eq!(env.id, "evt_1");
        match env.event {
            GatewayEvent::ChargeSucceeded {
                intent,
                amount_minor,
                metadata,
                ..
            } => {
                assert_eq!(intent, GatewayRef::new("pi_1"));
                assert_eq!(amount_minor, 48000);
                assert_eq!(metadata.payment_id, Some(payment));
                assert_eq!(metadata.kind, Some(PaymentType::Deposit));
                assert_eq!(metadata.user_id, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decodes_refunded() {
        let payload = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{
            "id":"ch_1","payment_intent":"pi_1","amount_refunded":2500,
            "refunds":{"data":[{"id":"re_1"}]}}}}"#;
        let env = GatewayEnvelope::decode(payload).unwrap();
        assert_eq!(
            env.event,
            GatewayEvent::ChargeRefunded {
                charge: ChargeRef("ch_1".into()),
                intent: GatewayRef::new("pi_1"),
                amount_refunded_minor: 2500,
                refund: Some(RefundRef("re_1".into())),
            }
        );
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let payload = br#"{"id":"evt_3","type":"customer.created","data":{"object":{"x":1}}}"#;
        let env = GatewayEnvelope::decode(payload).unwrap();
        assert_eq!(
            env.event,
            GatewayEvent::Unrecognized {
                kind: "customer.created".into()
            }
        );
        assert_eq!(env.event.label(), "customer.created");
    }

    #[test]
    fn malformed_object_rejected() {
        let payload = br#"{"id":"evt_4","type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(
            GatewayEnvelope::decode(payload),
            Err(SettlementError::MalformedEvent { .. })
        ));
        assert!(GatewayEnvelope::decode(b"not json").is_err());
    }
}
