//! Optimistic multi-document transactions.
//!
//! A [`Transaction`] records the version of every document it reads and
//! buffers every write. On commit the store checks that none of the read
//! documents moved since; if one did, the whole transaction is rejected and
//! [`run_transaction`] re-runs the body against fresh state. Bodies return
//! `Result` values rather than unwinding, so the runner can tell
//! abort-and-retry (conflicts, store outages) from abort-fatal (everything
//! else).

use std::collections::BTreeMap;
use std::time::Duration;

use gavel_types::{
    Auction, AuctionId, Contract, LedgerEntry, Payment, PaymentId, PlatformRevenueEvent,
    Result, RetryPolicy, SettlementError, UserId, UserProfile, Wallet,
};
use rand::Rng;
use tracing::{debug, warn};

use crate::store::{CommitBatch, DocKey, Document, DocumentStore, Query};

/// Read-tracking, write-buffering view over a [`DocumentStore`].
pub struct Transaction<'s> {
    store: &'s dyn DocumentStore,
    /// Version observed for every key read (`None`: absent).
    reads: BTreeMap<DocKey, Option<u64>>,
    /// Committed state as first observed.
    snapshot: BTreeMap<DocKey, Option<Document>>,
    writes: BTreeMap<DocKey, Document>,
}

impl<'s> Transaction<'s> {
    #[must_use]
    pub fn new(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a document, seeing this transaction's own buffered writes.
    pub fn get(&mut self, key: DocKey) -> Result<Option<Document>> {
        if let Some(doc) = self.writes.get(&key) {
            return Ok(Some(doc.clone()));
        }
        if let Some(doc) = self.snapshot.get(&key) {
            return Ok(doc.clone());
        }
        let loaded = self.store.get(&key)?;
        self.reads.insert(key, loaded.as_ref().map(|v| v.version));
        let doc = loaded.map(|v| v.doc);
        self.snapshot.insert(key, doc.clone());
        Ok(doc)
    }

    /// Buffer a full-document write.
    pub fn put(&mut self, doc: Document) {
        self.writes.insert(doc.key(), doc);
    }

    /// Insert `doc` only if its key is absent. Returns whether it was
    /// inserted; an existing document is left untouched.
    pub fn create(&mut self, doc: Document) -> Result<bool> {
        if self.get(doc.key())?.is_some() {
            return Ok(false);
        }
        self.put(doc);
        Ok(true)
    }

    /// Keys matching `query`. Query results are not tracked; re-read each
    /// document through this transaction before acting on it.
    pub fn query(&self, query: &Query) -> Result<Vec<DocKey>> {
        self.store.query(query)
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Submit the buffered writes. Read-only transactions never reach the
    /// store.
    pub fn commit(self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let mut preconditions: Vec<(DocKey, Option<u64>)> =
            self.reads.iter().map(|(k, v)| (*k, *v)).collect();
        // Blind writes must not overwrite anything.
        for key in self.writes.keys() {
            if !self.reads.contains_key(key) {
                preconditions.push((*key, None));
            }
        }
        self.store.commit(CommitBatch {
            preconditions,
            writes: self.writes.into_values().collect(),
        })
    }

    // ---------------------------------------------------------------------
    // Typed accessors
    // ---------------------------------------------------------------------

    pub fn auction(&mut self, id: AuctionId) -> Result<Option<Auction>> {
        let key = DocKey::Auction(id);
        match self.get(key)? {
            None => Ok(None),
            Some(Document::Auction(a)) => Ok(Some(a)),
            Some(other) => Err(wrong_kind(key, &other)),
        }
    }

    /// Like [`auction`](Self::auction) but absent is `AuctionNotFound`.
    pub fn require_auction(&mut self, id: AuctionId) -> Result<Auction> {
        self.auction(id)?
            .ok_or(SettlementError::AuctionNotFound(id))
    }

    pub fn put_auction(&mut self, auction: Auction) {
        self.put(Document::Auction(auction));
    }

    /// The user's wallet, or a zero wallet if none exists yet. A zero wallet
    /// is only persisted once it is written back.
    pub fn wallet(&mut self, user_id: UserId) -> Result<Wallet> {
        let key = DocKey::Wallet(user_id);
        match self.get(key)? {
            None => Ok(Wallet::empty(user_id)),
            Some(Document::Wallet(w)) => Ok(w),
            Some(other) => Err(wrong_kind(key, &other)),
        }
    }

    /// Whether the user already has a stored wallet.
    pub fn has_wallet(&mut self, user_id: UserId) -> Result<bool> {
        Ok(self.get(DocKey::Wallet(user_id))?.is_some())
    }

    pub fn put_wallet(&mut self, wallet: Wallet) {
        self.put(Document::Wallet(wallet));
    }

    pub fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        let key = DocKey::Payment(id);
        match self.get(key)? {
            None => Ok(None),
            Some(Document::Payment(p)) => Ok(Some(p)),
            Some(other) => Err(wrong_kind(key, &other)),
        }
    }

    pub fn put_payment(&mut self, payment: Payment) {
        self.put(Document::Payment(payment));
    }

    pub fn user_profile(&mut self, id: UserId) -> Result<Option<UserProfile>> {
        let key = DocKey::User(id);
        match self.get(key)? {
            None => Ok(None),
            Some(Document::User(u)) => Ok(Some(u)),
            Some(other) => Err(wrong_kind(key, &other)),
        }
    }

    pub fn contract(&mut self, auction_id: AuctionId) -> Result<Option<Contract>> {
        let key = DocKey::Contract(auction_id);
        match self.get(key)? {
            None => Ok(None),
            Some(Document::Contract(c)) => Ok(Some(c)),
            Some(other) => Err(wrong_kind(key, &other)),
        }
    }

    /// Append a revenue event. Its id is deterministic, so a repeated append
    /// of the same logical event returns `false` and writes nothing.
    pub fn append_revenue(&mut self, event: PlatformRevenueEvent) -> Result<bool> {
        self.create(Document::Revenue(event))
    }

    /// Append a wallet journal entry.
    pub fn append_journal(&mut self, entry: LedgerEntry) {
        self.put(Document::Journal(entry));
    }
}

fn wrong_kind(key: DocKey, found: &Document) -> SettlementError {
    SettlementError::ConsistencyViolation {
        reason: format!("{key} holds a {} document", found.collection()),
    }
}

/// Errors that justify re-running a transaction body from scratch.
fn is_transient(err: &SettlementError) -> bool {
    matches!(
        err,
        SettlementError::TransactionConflict { .. } | SettlementError::Store { .. }
    )
}

/// Run `body` in a fresh transaction and commit it, retrying conflicts and
/// store outages with exponential backoff plus jitter.
///
/// Any other error aborts immediately and is returned unchanged. Once the
/// retry budget is spent the last transient error is wrapped in
/// [`SettlementError::RetryBudgetExhausted`].
pub fn run_transaction<T, F>(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    label: &str,
    mut body: F,
) -> Result<T>
where
    F: FnMut(&mut Transaction<'_>) -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 0..attempts {
        let mut tx = Transaction::new(store);
        let outcome = body(&mut tx).and_then(|value| tx.commit().map(|()| value));
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) => {
                debug!(label, attempt, error = %err, "transaction retry");
                last = err.to_string();
                if attempt + 1 < attempts {
                    backoff(policy, attempt);
                }
            }
            Err(err) => return Err(err),
        }
    }

    warn!(label, attempts, last = %last, "transaction retry budget exhausted");
    Err(SettlementError::RetryBudgetExhausted {
        label: label.to_string(),
        attempts,
        last,
    })
}

fn backoff(policy: &RetryPolicy, attempt: u32) {
    let base = policy.backoff_ms(attempt);
    if base == 0 {
        return;
    }
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    std::thread::sleep(Duration::from_millis(base + jitter));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::memory::{FaultyStore, MemoryStore};
    use crate::store::Versioned;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn reads_see_own_writes() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let mut tx = Transaction::new(&store);
        let mut wallet = tx.wallet(user).unwrap();
        assert_eq!(wallet.total(), Decimal::ZERO);
        wallet.credit_available(dec(10)).unwrap();
        tx.put_wallet(wallet);
        assert_eq!(tx.wallet(user).unwrap().available, dec(10));
        tx.commit().unwrap();
        assert!(store.get(&DocKey::Wallet(user)).unwrap().is_some());
    }

    #[test]
    fn read_only_transaction_skips_commit() {
        let store = MemoryStore::new();
        let mut tx = Transaction::new(&store);
        assert!(tx.auction(AuctionId::new()).unwrap().is_none());
        assert!(tx.is_read_only());
        tx.commit().unwrap();
        assert_eq!(store.commit_count().unwrap(), 0);
    }

    #[test]
    fn interleaved_writer_loses() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let mut first = Transaction::new(&store);
        let mut second = Transaction::new(&store);
        let mut w1 = first.wallet(user).unwrap();
        let mut w2 = second.wallet(user).unwrap();
        w1.credit_available(dec(5)).unwrap();
        w2.credit_available(dec(7)).unwrap();
        first.put_wallet(w1);
        second.put_wallet(w2);

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, SettlementError::TransactionConflict { .. }));
        let Some(Versioned { doc: Document::Wallet(w), .. }) =
            store.get(&DocKey::Wallet(user)).unwrap()
        else {
            panic!("wallet missing");
        };
        assert_eq!(w.available, dec(5));
    }

    #[test]
    fn create_is_insert_if_absent() {
        let store = MemoryStore::new();
        let auction = AuctionId::new();
        let event = PlatformRevenueEvent::new(
            auction,
            UserId::new(),
            gavel_types::RevenueKind::Forfeit,
            dec(3),
            "aed",
            None,
            Utc::now(),
        );
        run_transaction(&store, &RetryPolicy::immediate(1), "t", |tx| {
            tx.append_revenue(event.clone())
        })
        .unwrap();
        let again = run_transaction(&store, &RetryPolicy::immediate(1), "t", |tx| {
            tx.append_revenue(event.clone())
        })
        .unwrap();
        assert!(!again);
        assert_eq!(
            store.query(&Query::RevenueForAuction(auction)).unwrap().len(),
            1
        );
    }

    #[test]
    fn runner_retries_conflicts() {
        let faulty = FaultyStore::new(Arc::new(MemoryStore::new()));
        faulty.inject_conflicts(2);
        let user = UserId::new();
        let mut runs = 0;
        run_transaction(&faulty, &RetryPolicy::immediate(5), "credit", |tx| {
            runs += 1;
            let mut wallet = tx.wallet(user)?;
            wallet.credit_available(dec(1))?;
            tx.put_wallet(wallet);
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, 3);
    }

    #[test]
    fn runner_gives_up_after_budget() {
        let faulty = FaultyStore::new(Arc::new(MemoryStore::new()));
        faulty.inject_outages(10);
        let user = UserId::new();
        let err = run_transaction(&faulty, &RetryPolicy::immediate(3), "credit", |tx| {
            tx.put_wallet(Wallet::empty(user));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::RetryBudgetExhausted { attempts: 3, .. }
        ));
    }

    #[test]
    fn runner_does_not_retry_business_errors() {
        let store = MemoryStore::new();
        let mut runs = 0;
        let err = run_transaction(&store, &RetryPolicy::immediate(5), "reserve", |tx| {
            runs += 1;
            let mut wallet = tx.wallet(UserId::new())?;
            wallet.reserve(dec(1))?;
            Ok(())
        })
        .unwrap_err();
        assert_eq!(runs, 1);
        assert!(matches!(err, SettlementError::InsufficientFunds { .. }));
    }
}
