//! Error types for the ledger
//!
//! This module defines the errors returned by the ledger and by the
//! collaborators it drives (persistence and event publishing).
//!
//! # Error Categories
//!
//! - **Business-rule errors**: Not found, invalid request, insufficient funds,
//!   closed account, non-zero balance. Returned directly to the caller and
//!   never retried, since retrying without new input cannot change the outcome.
//! - **Persistence errors**: Store unavailable, version conflict, timeout.
//!   The unit of work is aborted and nothing is applied; the caller may retry.
//! - **Publish errors**: Event bus unavailable. Never reverses a committed
//!   balance change.

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use super::account::AccountId;

/// Kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Account,
    Transaction,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => f.write_str("Account"),
            EntityKind::Transaction => f.write_str("Transaction"),
        }
    }
}

/// Errors raised by account stores, transaction logs and units of work
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The requested row does not exist (or is not visible to the owner)
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: u64 },

    /// The row changed since it was read or locked
    #[error("Version conflict on account {account}: expected {expected}, found {found}")]
    Conflict {
        account: AccountId,
        expected: u64,
        found: u64,
    },

    /// A unit of work tried to write a row it does not hold the lock on
    #[error("Account {account} is not locked by this unit of work")]
    NotLocked { account: AccountId },

    /// The backend could not serve the request
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// The unit of work exceeded its deadline and was rolled back
    #[error("Operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The unit of work was already committed or rolled back
    #[error("Unit of work is closed")]
    Closed,
}

impl StoreError {
    /// Create an Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    /// Create a NotFound error for an account
    pub fn account_not_found(id: AccountId) -> Self {
        StoreError::NotFound {
            entity: EntityKind::Account,
            id,
        }
    }
}

/// Errors raised by event publishers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PublishError {
    /// The event channel is not reachable
    #[error("Event bus unavailable: {message}")]
    Unavailable { message: String },

    /// The event could not be encoded
    #[error("Event encoding failed: {message}")]
    Encoding { message: String },

    /// The publish did not finish within the caller's deadline
    #[error("Publish timed out after {millis}ms")]
    Timeout { millis: u64 },
}

/// Stable, machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Validation,
    InvalidAmount,
    InsufficientFunds,
    AccountClosed,
    NonZeroBalance,
    PersistenceFailure,
    PublishFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::AccountClosed => "account_closed",
            ErrorKind::NonZeroBalance => "non_zero_balance",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::PublishFailure => "publish_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the ledger
///
/// Every variant maps to a stable [`ErrorKind`] and renders a
/// human-readable message. Store internals only ever surface through
/// the `Persistence` wrapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Account or transaction absent, or not owned by the caller
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: u64 },

    /// Malformed transfer request (non-positive amount, self-transfer, ...)
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Missing or malformed input field
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Deposit amount that is not positive or not representable
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    /// Source balance is lower than the requested amount
    #[error("Insufficient funds on account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    /// The account is closed and accepts no balance mutation
    #[error("Account {account} is closed")]
    AccountClosed { account: AccountId },

    /// Close attempted on an account that still holds funds
    #[error("Account {account} has non-zero balance {balance}")]
    NonZeroBalance { account: AccountId, balance: Decimal },

    /// The atomic write was aborted; no partial state was left behind
    #[error("Persistence failure: {0}")]
    Persistence(StoreError),

    /// The event was not delivered; committed ledger changes stay in place
    #[error("Failed to publish to {topic}: {source}")]
    PublishFailure {
        topic: String,
        #[source]
        source: PublishError,
    },
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::Persistence(other),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Stable error code for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            LedgerError::Validation { .. } => ErrorKind::Validation,
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::AccountClosed { .. } => ErrorKind::AccountClosed,
            LedgerError::NonZeroBalance { .. } => ErrorKind::NonZeroBalance,
            LedgerError::Persistence(_) => ErrorKind::PersistenceFailure,
            LedgerError::PublishFailure { .. } => ErrorKind::PublishFailure,
        }
    }

    /// Whether a caller-driven retry of the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Persistence(_) | LedgerError::PublishFailure { .. }
        )
    }

    /// Create a NotFound error for an account
    pub fn account_not_found(id: AccountId) -> Self {
        LedgerError::NotFound {
            entity: EntityKind::Account,
            id,
        }
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        LedgerError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a Validation error
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal, reason: impl Into<String>) -> Self {
        LedgerError::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: AccountId, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            available,
            requested,
        }
    }

    /// Create an AccountClosed error
    pub fn account_closed(account: AccountId) -> Self {
        LedgerError::AccountClosed { account }
    }

    /// Create a NonZeroBalance error
    pub fn non_zero_balance(account: AccountId, balance: Decimal) -> Self {
        LedgerError::NonZeroBalance { account, balance }
    }

    /// Create a PublishFailure error
    pub fn publish_failure(topic: &str, source: PublishError) -> Self {
        LedgerError::PublishFailure {
            topic: topic.to_string(),
            source,
        }
    }
}
