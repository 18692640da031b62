//! Document-store contract.
//!
//! The engine needs three things from its store: versioned single-document
//! reads, an atomic multi-document commit guarded by per-document version
//! preconditions (first committer wins), and equality/range lookups over a
//! handful of fields. Everything above this module speaks [`DocumentStore`];
//! [`MemoryStore`](crate::MemoryStore) is the in-process implementation.

use std::fmt;

use chrono::{DateTime, Utc};
use gavel_types::{
    Auction, AuctionId, AuctionState, Contract, GatewayRef, LedgerEntry, LedgerEntryId, Payment,
    PaymentId, PaymentStatus, PaymentType, PlatformRevenueEvent, Result, RevenueEventId,
    UserId, UserProfile, Wallet,
};

/// Address of one document. The variant names the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocKey {
    Auction(AuctionId),
    Wallet(UserId),
    Payment(PaymentId),
    User(UserId),
    Contract(AuctionId),
    Revenue(RevenueEventId),
    Journal(LedgerEntryId),
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auction(id) => write!(f, "auctions/{id}"),
            Self::Wallet(id) => write!(f, "wallets/{id}"),
            Self::Payment(id) => write!(f, "payments/{}", id.0),
            Self::User(id) => write!(f, "users/{id}"),
            Self::Contract(id) => write!(f, "contracts/{id}"),
            Self::Revenue(id) => write!(f, "platformRevenueEvents/{}", id.0),
            Self::Journal(id) => write!(f, "ledgerEntries/{}", id.0),
        }
    }
}

/// A stored document of any collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    Auction(Auction),
    Wallet(Wallet),
    Payment(Payment),
    User(UserProfile),
    Contract(Contract),
    Revenue(PlatformRevenueEvent),
    Journal(LedgerEntry),
}

impl Document {
    /// Key this document is stored under.
    #[must_use]
    pub fn key(&self) -> DocKey {
        match self {
            Self::Auction(a) => DocKey::Auction(a.id),
            Self::Wallet(w) => DocKey::Wallet(w.user_id),
            Self::Payment(p) => DocKey::Payment(p.id),
            Self::User(u) => DocKey::User(u.user_id),
            Self::Contract(c) => DocKey::Contract(c.auction_id),
            Self::Revenue(r) => DocKey::Revenue(r.id),
            Self::Journal(e) => DocKey::Journal(e.id),
        }
    }

    /// Collection name, for diagnostics.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Auction(_) => "auctions",
            Self::Wallet(_) => "wallets",
            Self::Payment(_) => "payments",
            Self::User(_) => "users",
            Self::Contract(_) => "contracts",
            Self::Revenue(_) => "platformRevenueEvents",
            Self::Journal(_) => "ledgerEntries",
        }
    }
}

/// A document together with the version it was read at.
///
/// Versions start at 1 on insert and increase by one on every committed
/// write. An absent document has no version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub doc: Document,
}

/// The unit handed to [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Every document the transaction observed, with the version it saw
    /// (`None`: observed absent).
    pub preconditions: Vec<(DocKey, Option<u64>)>,
    /// Full replacement documents.
    pub writes: Vec<Document>,
}

/// Equality filter over the payments collection. `None` fields match all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub user_id: Option<UserId>,
    pub auction_id: Option<AuctionId>,
    pub kind: Option<PaymentType>,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    #[must_use]
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user_id.is_none_or(|u| payment.user_id == u)
            && self.auction_id.is_none_or(|a| payment.auction_id == Some(a))
            && self.kind.is_none_or(|k| payment.kind == k)
            && self.status.is_none_or(|s| payment.status == s)
    }
}

/// Lookups the engine issues. Results are keys; callers re-read the
/// documents inside their transaction so the guards see current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// `ACTIVE` auctions with `endsAt <= now`.
    AuctionsDueForClose { now: DateTime<Utc> },
    /// `ENDED` auctions, not buyer-confirmed, with `winnerDeadlineAt <= now`.
    AuctionsPastDeadline { now: DateTime<Utc> },
    /// Payments carrying this gateway reference.
    PaymentsByGatewayRef(GatewayRef),
    /// Payments matching an equality filter.
    Payments(PaymentFilter),
    /// Journal entries of one user's wallet.
    JournalForUser(UserId),
    /// Revenue events of one auction.
    RevenueForAuction(AuctionId),
    /// Every wallet.
    Wallets,
}

impl Query {
    /// Whether `doc` belongs to this query's result set.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match (self, doc) {
            (Self::AuctionsDueForClose { now }, Document::Auction(a)) => {
                a.state == AuctionState::Active && a.ends_at <= *now
            }
            (Self::AuctionsPastDeadline { now }, Document::Auction(a)) => {
                a.state == AuctionState::Ended
                    && !a.buyer_confirmed_purchase
                    && a.winner_deadline_at.is_some_and(|at| at <= *now)
            }
            (Self::PaymentsByGatewayRef(r), Document::Payment(p)) => p.gateway_ref.as_ref() == Some(r),
            (Self::Payments(filter), Document::Payment(p)) => filter.matches(p),
            (Self::JournalForUser(user), Document::Journal(e)) => e.user_id == *user,
            (Self::RevenueForAuction(id), Document::Revenue(r)) => r.auction_id == *id,
            (Self::Wallets, Document::Wallet(_)) => true,
            _ => false,
        }
    }
}

/// Transactional document store.
///
/// Implementations must apply a [`CommitBatch`] atomically: either every
/// precondition holds and every write lands, or nothing changes and
/// [`SettlementError::TransactionConflict`](gavel_types::SettlementError::TransactionConflict)
/// is returned. Outages are reported as `SettlementError::Store`.
pub trait DocumentStore: Send + Sync {
    /// Read one document with its current version.
    fn get(&self, key: &DocKey) -> Result<Option<Versioned>>;

    /// Atomically check preconditions and apply writes.
    fn commit(&self, batch: CommitBatch) -> Result<()>;

    /// Keys of documents matching `query`, in key order.
    fn query(&self, query: &Query) -> Result<Vec<DocKey>>;
}
