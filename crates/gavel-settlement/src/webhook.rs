//! Gateway webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! The signed message is `"<t>.<raw payload>"` under HMAC-SHA256 with the
//! shared signing secret. Several `v1` entries may be present while the
//! gateway rotates secrets; any one matching is enough.

use chrono::{DateTime, Utc};
use gavel_types::{GatewayEnvelope, Result, SettlementError, WebhookConfig};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies signed gateway payloads before they are decoded.
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    #[must_use]
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            secret: config.signing_secret.as_bytes().to_vec(),
            tolerance_secs: config.tolerance_secs,
        }
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SettlementError::Configuration(format!("webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Produce a signature header for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }

    /// Check the header against the payload.
    ///
    /// # Errors
    /// [`SettlementError::InvalidSignature`] if the header is malformed, the
    /// timestamp is outside the tolerance, or no signature matches.
    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| invalid("missing or malformed timestamp"))?;
        if signatures.is_empty() {
            return Err(invalid("no v1 signature"));
        }
        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(invalid("timestamp outside tolerance"));
        }

        let expected = self.mac(timestamp, payload)?;
        let matched = signatures.iter().any(|sig| {
            hex::decode(sig)
                .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(invalid("signature mismatch"));
        }
        Ok(())
    }

    /// Verify, then decode into a typed envelope.
    pub fn verify_and_decode(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<GatewayEnvelope> {
        self.verify(payload, header, now)?;
        GatewayEnvelope::decode(payload)
    }
}

fn invalid(reason: &str) -> SettlementError {
    SettlementError::InvalidSignature {
        reason: reason.to_string(),
    }
}
