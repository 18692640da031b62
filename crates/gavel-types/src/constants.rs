//! System-wide constants for the Gavel settlement engine.

/// Decimal places kept for major-unit money amounts.
pub const MONEY_SCALE: u32 = 2;

/// Minor units per major unit (fils per dirham, cents per dollar).
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Default currency for charges and revenue records.
pub const DEFAULT_CURRENCY: &str = "aed";

/// Hours a winner has after auction end before the deposit is forfeited.
pub const DEFAULT_WINNER_DEADLINE_HOURS: u32 = 48;

/// Default interval between "close auctions" sweeps, in seconds.
pub const DEFAULT_CLOSE_INTERVAL_SECS: u64 = 60;

/// Default interval between "enforce deadlines" sweeps, in seconds.
pub const DEFAULT_DEADLINE_INTERVAL_SECS: u64 = 300;

/// Default number of attempts per transaction before giving up on the item.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Base backoff between transaction attempts, in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 20;

/// Upper bound on a single backoff, in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 500;

/// Accepted clock skew between a webhook's signed timestamp and now.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Version stamped on newly created delivery contracts.
pub const CONTRACT_VERSION: &str = "1.0";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Gavel";
