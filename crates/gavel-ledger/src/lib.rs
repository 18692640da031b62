//! # gavel-ledger
//!
//! **Ledger plane**: the persistence contract and the money-moving
//! primitives the settlement engine composes.
//!
//! ## Architecture
//!
//! - [`DocumentStore`]: versioned reads, atomic multi-document commits with
//!   first-committer-wins preconditions, and equality/range queries
//! - [`Transaction`] and [`run_transaction`]: read-tracking optimistic
//!   transactions with a bounded, jittered retry budget
//! - [`wallet_ledger`]: reserve, release, forfeit and credit, each journaled
//! - [`payments`]: the Payment Record Store
//! - [`ConservationAudit`]: replays the journal against stored wallets
//!
//! [`MemoryStore`] is the in-process store used by tests and single-node
//! deployments.

pub mod conservation;
pub mod memory;
pub mod payments;
pub mod store;
pub mod transaction;
pub mod wallet_ledger;

pub use conservation::{ConservationAudit, ConservationReport};
#[cfg(any(test, feature = "test-helpers"))]
pub use memory::FaultyStore;
pub use memory::MemoryStore;
pub use payments::PaymentRecords;
pub use store::{CommitBatch, DocKey, Document, DocumentStore, PaymentFilter, Query, Versioned};
pub use transaction::{Transaction, run_transaction};
pub use wallet_ledger::{MoveContext, WalletLedger};
