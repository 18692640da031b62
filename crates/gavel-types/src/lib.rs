//! # gavel-types
//!
//! Shared types, errors, and configuration for the **Gavel** auction
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AuctionId`], [`UserId`], [`PaymentId`], [`RevenueEventId`], [`LedgerEntryId`], [`GatewayRef`], [`ChargeRef`], [`RefundRef`]
//! - **Auction model**: [`Auction`], [`AuctionState`], [`DepositStatus`], [`CommissionStatus`], [`CommissionSide`]
//! - **Wallet model**: [`Wallet`], [`LedgerMove`], [`LedgerEntry`]
//! - **Payment model**: [`Payment`], [`PaymentType`], [`PaymentStatus`]
//! - **Records**: [`PlatformRevenueEvent`], [`Contract`], [`UserProfile`], [`Caller`]
//! - **Tier rules**: [`Tier`], [`TierSchedule`]
//! - **Gateway events**: [`GatewayEvent`], [`GatewayEnvelope`], [`ChargeMetadata`]
//! - **Configuration**: [`SettlementConfig`], [`RetryPolicy`], [`WebhookConfig`], [`SweepConfig`]
//! - **Errors**: [`SettlementError`] with `GV_ERR_` prefix codes, [`ErrorCategory`], [`RpcError`]
//! - **Constants** and **money** helpers (major/minor unit conversion)

pub mod auction;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod money;
pub mod payment;
pub mod records;
pub mod tier;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use gavel_types::{Auction, Payment, Wallet, SettlementError, ...};

pub use auction::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use payment::*;
pub use records::*;
pub use tier::*;
pub use wallet::*;

// Constants and money helpers are accessed via their modules
// (`gavel_types::constants::FOO`, `gavel_types::money::to_minor_units`).
