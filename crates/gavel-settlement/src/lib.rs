//! # gavel-settlement
//!
//! **Settlement plane**: turns auction outcomes and gateway events into
//! wallet movements, revenue records and lifecycle transitions.
//!
//! ## Architecture
//!
//! [`SettlementEngine`] owns the store, the gateway and the configuration
//! and exposes:
//! 1. Closing sweep: `ACTIVE` past its end time → `ENDED`, winner deposit
//!    held, waived or marked insufficient, delivery contract created
//! 2. Deadline sweep: `ENDED` past the winner deadline → deposit forfeited,
//!    `ENDED_NO_RESPONSE`
//! 3. Webhook confirmation: signed gateway events applied exactly once per
//!    payment status
//! 4. Operator operations: charge intents, intent association, manual
//!    forfeit or refund
//!
//! Every step is a guarded transition, so re-running a sweep or
//! redelivering an event converges on the same state.

pub mod closing;
pub mod confirmation;
pub mod deadline;
pub mod engine;
pub mod gateway;
pub mod intents;
pub mod lifecycle;
pub mod manual;
pub mod rpc;
pub mod webhook;

pub use closing::CloseOutcome;
pub use confirmation::Confirmation;
pub use deadline::DeadlineOutcome;
pub use engine::{SettlementEngine, SweepReport};
pub use gateway::{GatewayIntent, InMemoryGateway, IntentRequest, PaymentGateway};
pub use intents::{ChargeIntentRequest, ChargeIntentResponse};
pub use lifecycle::ListingOutcome;
pub use manual::{ManualAction, ManualSettlement, ManualSettlementRequest};
pub use rpc::{OperatorRpc, RpcResult};
pub use webhook::WebhookVerifier;
