//! Identifiers used throughout Gavel.
//!
//! Internal entity IDs use UUIDv7 for time-ordered sorting. Identifiers
//! assigned by the payment gateway are opaque strings and are never parsed.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AuctionId
// ---------------------------------------------------------------------------

/// Stable, externally referenced auction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AuctionId(pub Uuid);

impl AuctionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Identifier of a bidder, seller or operator. Wallets are addressed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PaymentId
// ---------------------------------------------------------------------------

/// Internal payment identifier.
///
/// Allocated *before* the gateway charge is requested and embedded in the
/// charge metadata, so gateway events can be correlated back to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse the id carried in gateway metadata. Returns `None` for empty or
    /// malformed values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pay:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RevenueEventId
// ---------------------------------------------------------------------------

/// Identifier of a [`PlatformRevenueEvent`](crate::PlatformRevenueEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RevenueEventId(pub Uuid);

impl RevenueEventId {
    /// Deterministic id from the auction, the revenue kind and the source
    /// payment (if any).
    ///
    /// Appending the same logical revenue twice produces the same id, so the
    /// second append collides in the store instead of double-counting.
    #[must_use]
    pub fn deterministic(auction_id: AuctionId, kind: &str, source: Option<PaymentId>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"gavel:revenue:v1:");
        hasher.update(auction_id.0.as_bytes());
        hasher.update(kind.as_bytes());
        if let Some(payment) = source {
            hasher.update(payment.0.as_bytes());
        }
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for RevenueEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LedgerEntryId
// ---------------------------------------------------------------------------

/// Identifier of a wallet journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerEntryId(pub Uuid);

impl LedgerEntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "led:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Gateway-assigned references
// ---------------------------------------------------------------------------

/// Gateway-assigned id of a charge intent (e.g. `pi_3Nk...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayRef(pub String);

impl GatewayRef {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway-assigned id of a captured charge (e.g. `ch_3Nk...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeRef(pub String);

impl fmt::Display for ChargeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway-assigned id of a refund (e.g. `re_3Nk...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefundRef(pub String);

impl fmt::Display for RefundRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_id_ordering() {
        let a = PaymentId::new();
        let b = PaymentId::new();
        assert!(a < b);
    }

    #[test]
    fn payment_id_parse() {
        let id = PaymentId::new();
        assert_eq!(PaymentId::parse(&id.0.to_string()), Some(id));
        assert_eq!(PaymentId::parse(""), None);
        assert_eq!(PaymentId::parse("not-a-uuid"), None);
    }

    #[test]
    fn revenue_id_deterministic() {
        let auction = AuctionId::new();
        let payment = PaymentId::new();
        let a = RevenueEventId::deterministic(auction, "forfeit", None);
        let b = RevenueEventId::deterministic(auction, "forfeit", None);
        assert_eq!(a, b);

        let c = RevenueEventId::deterministic(auction, "buyer_commission", Some(payment));
        assert_ne!(a, c);
        let d = RevenueEventId::deterministic(AuctionId::new(), "forfeit", None);
        assert_ne!(a, d);
    }

    #[test]
    fn gateway_ref_is_transparent() {
        let r = GatewayRef::new("pi_123");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"pi_123\"");
        assert_eq!(r.to_string(), "pi_123");
    }
}
