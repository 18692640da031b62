//! In-process [`DocumentStore`] with first-committer-wins commits.
//!
//! A single mutex serializes commits, so a batch's precondition check and
//! its writes are observed atomically by every other caller. Reads outside
//! a commit see the last committed state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use gavel_types::{Result, SettlementError};
use tracing::trace;

use crate::store::{CommitBatch, DocKey, Document, DocumentStore, Query, Versioned};

#[derive(Default)]
struct Inner {
    docs: HashMap<DocKey, Versioned>,
    commits: u64,
}

/// Mutex-guarded map of versioned documents.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| SettlementError::Store {
            reason: "memory store mutex poisoned".into(),
        })
    }

    /// Write documents unconditionally, bumping their versions. For loading
    /// fixtures and documents owned by flows outside the engine.
    pub fn seed(&self, docs: impl IntoIterator<Item = Document>) -> Result<()> {
        let mut inner = self.lock()?;
        for doc in docs {
            let key = doc.key();
            let version = inner.docs.get(&key).map_or(1, |v| v.version + 1);
            inner.docs.insert(key, Versioned { version, doc });
        }
        Ok(())
    }

    /// Number of stored documents.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.docs.len())
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.docs.is_empty())
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> Result<u64> {
        Ok(self.lock()?.commits)
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &DocKey) -> Result<Option<Versioned>> {
        Ok(self.lock()?.docs.get(key).cloned())
    }

    fn commit(&self, batch: CommitBatch) -> Result<()> {
        let mut inner = self.lock()?;

        for (key, expected) in &batch.preconditions {
            let current = inner.docs.get(key).map(|v| v.version);
            if current != *expected {
                trace!(%key, ?expected, ?current, "commit rejected");
                return Err(SettlementError::TransactionConflict {
                    document: key.to_string(),
                });
            }
        }

        for doc in batch.writes {
            let key = doc.key();
            let version = inner.docs.get(&key).map_or(1, |v| v.version + 1);
            inner.docs.insert(key, Versioned { version, doc });
        }
        inner.commits += 1;
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<DocKey>> {
        let inner = self.lock()?;
        let mut keys: Vec<DocKey> = inner
            .docs
            .iter()
            .filter(|(_, v)| query.matches(&v.doc))
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use faulty::FaultyStore;

#[cfg(any(test, feature = "test-helpers"))]
mod faulty {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::{CommitBatch, DocKey, DocumentStore, Query, Result, SettlementError, Versioned};

    /// Wraps a store and rejects the next `n` commits with a conflict.
    /// **Never use in production.**
    pub struct FaultyStore {
        inner: Arc<dyn DocumentStore>,
        conflicts: AtomicU32,
        outages: AtomicU32,
    }

    impl FaultyStore {
        pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
            Self {
                inner,
                conflicts: AtomicU32::new(0),
                outages: AtomicU32::new(0),
            }
        }

        /// Fail the next `n` commits with `TransactionConflict`.
        pub fn inject_conflicts(&self, n: u32) {
            self.conflicts.store(n, Ordering::SeqCst);
        }

        /// Fail the next `n` commits with `Store`.
        pub fn inject_outages(&self, n: u32) {
            self.outages.store(n, Ordering::SeqCst);
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DocumentStore for FaultyStore {
        fn get(&self, key: &DocKey) -> Result<Option<Versioned>> {
            self.inner.get(key)
        }

        fn commit(&self, batch: CommitBatch) -> Result<()> {
            if Self::take(&self.outages) {
                return Err(SettlementError::Store {
                    reason: "injected outage".into(),
                });
            }
            if Self::take(&self.conflicts) {
                let document = batch
                    .writes
                    .first()
                    .map_or_else(|| "batch".to_string(), |d| d.key().to_string());
                return Err(SettlementError::TransactionConflict { document });
            }
            self.inner.commit(batch)
        }

        fn query(&self, query: &Query) -> Result<Vec<DocKey>> {
            self.inner.query(query)
        }
    }
}
