//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account records and lifecycle status
//! - `transaction`: Transaction records, kinds and query filters
//! - `money`: Currency minor-unit rules for fixed-point amounts
//! - `error`: Error types for the ledger and its collaborators

pub mod account;
pub mod error;
pub mod money;
pub mod transaction;

pub use account::{Account, AccountId, AccountStatus, NewAccount, UserId};
pub use error::{EntityKind, ErrorKind, LedgerError, PublishError, StoreError};
pub use money::{checked_credit, minor_units, to_currency_scale};
pub use transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionId, TransactionType, TransferKind,
    TransferRequest,
};
