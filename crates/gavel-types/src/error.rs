//! Error types for the Gavel settlement engine.
//!
//! All errors use the `GV_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (malformed input, bad signatures, bad config)
//! - 2xx: Authorization errors
//! - 3xx: Not-found errors
//! - 4xx: Funds errors
//! - 5xx: External service / transaction errors
//! - 6xx: Consistency violations
//! - 9xx: General / internal errors

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AuctionId, PaymentId, UserId};

/// Central error enum for all Gavel operations.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A required field is missing or malformed.
    #[error("GV_ERR_100: Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// An amount is non-positive, non-finite or out of range.
    #[error("GV_ERR_101: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The payment type tag is not one of the supported charge types.
    #[error("GV_ERR_102: Invalid payment type: {0}")]
    InvalidPaymentType(String),

    /// The gateway event signature did not verify.
    #[error("GV_ERR_103: Invalid event signature: {reason}")]
    InvalidSignature { reason: String },

    /// The gateway event envelope could not be decoded.
    #[error("GV_ERR_104: Malformed gateway event: {reason}")]
    MalformedEvent { reason: String },

    /// Configuration error (invalid config file, inverted tiers, etc.).
    #[error("GV_ERR_105: Configuration error: {0}")]
    Configuration(String),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The caller lacks the required role or does not own the entity.
    #[error("GV_ERR_200: Permission denied: {reason}")]
    PermissionDenied { reason: String },

    // =================================================================
    // Not-found Errors (3xx)
    // =================================================================
    /// The referenced auction does not exist.
    #[error("GV_ERR_300: Auction not found: {0}")]
    AuctionNotFound(AuctionId),

    /// The referenced payment does not exist.
    #[error("GV_ERR_301: Payment not found: {0}")]
    PaymentNotFound(String),

    /// No succeeded deposit exists for the (auction, user) pair.
    #[error("GV_ERR_302: No settled deposit for auction {auction_id} and user {user_id}")]
    SettledDepositNotFound {
        auction_id: AuctionId,
        user_id: UserId,
    },

    // =================================================================
    // Funds Errors (4xx)
    // =================================================================
    /// A wallet bucket holds less than the amount to be debited.
    #[error("GV_ERR_400: Insufficient {bucket} funds: need {needed}, have {available}")]
    InsufficientFunds {
        bucket: WalletBucket,
        needed: Decimal,
        available: Decimal,
    },

    // =================================================================
    // External Service / Transaction Errors (5xx)
    // =================================================================
    /// The payment gateway rejected the call or was unreachable.
    #[error("GV_ERR_500: Payment gateway error: {reason}")]
    Gateway { reason: String },

    /// The document store was unavailable.
    #[error("GV_ERR_501: Document store error: {reason}")]
    Store { reason: String },

    /// Another transaction committed first on an overlapping document set.
    #[error("GV_ERR_502: Transaction conflict on {document}")]
    TransactionConflict { document: String },

    /// A refund arrived for a payment that has not been confirmed yet.
    #[error("GV_ERR_503: Payment {0} is not settled yet")]
    PaymentNotSettled(PaymentId),

    /// The bounded retry budget for one transaction was used up.
    #[error("GV_ERR_504: Retry budget exhausted for {label} after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        label: String,
        attempts: u32,
        last: String,
    },

    // =================================================================
    // Consistency Violations (6xx)
    // =================================================================
    /// An invariant check failed (negative balance, journal mismatch, ...).
    #[error("GV_ERR_600: Consistency violation: {reason}")]
    ConsistencyViolation { reason: String },

    /// A status change that the entity's state machine forbids.
    #[error("GV_ERR_601: Illegal {entity} transition from {from} to {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("GV_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("GV_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (config file, disk).
    #[error("GV_ERR_902: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettlementError>;

/// The wallet bucket named in a funds error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletBucket {
    Available,
    Reserved,
    Locked,
}

impl fmt::Display for WalletBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Reserved => write!(f, "reserved"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// Caller-facing classification of a [`SettlementError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authorization,
    NotFound,
    InsufficientFunds,
    ExternalService,
    ConsistencyViolation,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::InsufficientFunds => "insufficient_funds",
            Self::ExternalService => "external_service",
            Self::ConsistencyViolation => "consistency_violation",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl SettlementError {
    /// Numeric code, matching the `GV_ERR_nnn` prefix of the message.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 100,
            Self::InvalidAmount { .. } => 101,
            Self::InvalidPaymentType(_) => 102,
            Self::InvalidSignature { .. } => 103,
            Self::MalformedEvent { .. } => 104,
            Self::Configuration(_) => 105,
            Self::PermissionDenied { .. } => 200,
            Self::AuctionNotFound(_) => 300,
            Self::PaymentNotFound(_) => 301,
            Self::SettledDepositNotFound { .. } => 302,
            Self::InsufficientFunds { .. } => 400,
            Self::Gateway { .. } => 500,
            Self::Store { .. } => 501,
            Self::TransactionConflict { .. } => 502,
            Self::PaymentNotSettled(_) => 503,
            Self::RetryBudgetExhausted { .. } => 504,
            Self::ConsistencyViolation { .. } => 600,
            Self::IllegalTransition { .. } => 601,
            Self::Internal(_) => 900,
            Self::Serialization(_) => 901,
            Self::Io(_) => 902,
        }
    }

    /// Map onto the caller-facing taxonomy.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            100..=199 => ErrorCategory::Validation,
            200..=299 => ErrorCategory::Authorization,
            300..=399 => ErrorCategory::NotFound,
            400..=499 => ErrorCategory::InsufficientFunds,
            500..=599 => ErrorCategory::ExternalService,
            600..=699 => ErrorCategory::ConsistencyViolation,
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether the failed unit of work may be retried as-is.
    ///
    /// Conflicts and outages are transient; everything else will fail the
    /// same way on the next attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Gateway { .. }
                | Self::Store { .. }
                | Self::TransactionConflict { .. }
                | Self::PaymentNotSettled(_)
        )
    }
}

impl From<std::io::Error> for SettlementError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Structured error returned across the operator RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
}

impl From<&SettlementError> for RpcError {
    fn from(err: &SettlementError) -> Self {
        Self {
            category: err.category(),
            code: format!("GV_ERR_{}", err.code()),
            message: err.to_string(),
        }
    }
}

impl From<SettlementError> for RpcError {
    fn from(err: SettlementError) -> Self {
        Self::from(&err)
    }
}
