//! Conservation audit.
//!
//! Invariant checked per wallet:
//! ```text
//! available + reserved + locked == Σ(credits) − Σ(forfeits)
//! ```
//!
//! Reserve and release only move funds between buckets, so they cancel out.
//! A mismatch means a wallet was written outside the four ledger moves; it
//! is reported as a consistency violation and never repaired here.

use std::sync::Arc;

use gavel_types::{Result, SettlementError, UserId};
use rust_decimal::Decimal;
use tracing::error;

use crate::store::{DocKey, Document, DocumentStore, Query};
use crate::transaction::Transaction;

/// Outcome of auditing one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConservationReport {
    pub user_id: UserId,
    /// Sum of the wallet's buckets.
    pub wallet_total: Decimal,
    /// Σ credits − Σ forfeits over the journal.
    pub journal_total: Decimal,
    pub entries: usize,
}

impl ConservationReport {
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.wallet_total == self.journal_total
    }
}

/// Replays the journal against stored wallets.
pub struct ConservationAudit {
    store: Arc<dyn DocumentStore>,
}

impl ConservationAudit {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Compute the report for one wallet without judging it.
    pub fn report(&self, user_id: UserId) -> Result<ConservationReport> {
        let mut tx = Transaction::new(self.store.as_ref());
        let wallet = tx.wallet(user_id)?;
        let keys = tx.query(&Query::JournalForUser(user_id))?;
        let mut journal_total = Decimal::ZERO;
        let mut entries = 0;
        for key in keys {
            if let Some(Document::Journal(entry)) = tx.get(key)? {
                journal_total += entry.total_delta();
                entries += 1;
            }
        }
        Ok(ConservationReport {
            user_id,
            wallet_total: wallet.total(),
            journal_total,
            entries,
        })
    }

    /// Verify one wallet.
    ///
    /// # Errors
    /// Returns [`SettlementError::ConsistencyViolation`] if the wallet total
    /// differs from its journal, or a bucket is negative.
    pub fn verify_wallet(&self, user_id: UserId) -> Result<ConservationReport> {
        let wallet = Transaction::new(self.store.as_ref()).wallet(user_id)?;
        if !wallet.is_well_formed() {
            error!(%user_id, "negative wallet bucket");
            return Err(SettlementError::ConsistencyViolation {
                reason: format!("wallet {user_id} has a negative bucket"),
            });
        }
        let report = self.report(user_id)?;
        if !report.is_balanced() {
            error!(
                %user_id,
                wallet_total = %report.wallet_total,
                journal_total = %report.journal_total,
                "conservation violated"
            );
            return Err(SettlementError::ConsistencyViolation {
                reason: format!(
                    "wallet {user_id}: total {} != journal {} over {} entries",
                    report.wallet_total, report.journal_total, report.entries
                ),
            });
        }
        Ok(report)
    }

    /// Verify every stored wallet, stopping at the first violation.
    pub fn verify_all(&self) -> Result<Vec<ConservationReport>> {
        let mut reports = Vec::new();
        for key in self.store.query(&Query::Wallets)? {
            if let DocKey::Wallet(user_id) = key {
                reports.push(self.verify_wallet(user_id)?);
            }
        }
        Ok(reports)
    }
}
