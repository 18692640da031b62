//! # gavel-scheduler
//!
//! Process plumbing around a [`SettlementEngine`](gavel_settlement::SettlementEngine):
//!
//! - [`SweepScheduler`] fires the close and deadline sweeps on fixed
//!   intervals until [`SchedulerHandle::shutdown`] is called
//! - [`init_tracing`] installs the global log subscriber
//!
//! Sweeps are safe to run concurrently with each other and with webhook
//! handling, so the triggers need no coordination beyond their own timers.

pub mod logging;
pub mod scheduler;

pub use logging::{LogFormat, init_tracing};
pub use scheduler::{SchedulerHandle, Sweep, SweepScheduler, run_sweep};
