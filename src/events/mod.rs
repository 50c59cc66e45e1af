//! Ledger events
//!
//! Events announce committed ledger changes to downstream systems. They are
//! built from already-committed records and are published strictly after
//! the unit of work that produced them, never inside it.
//!
//! - `publisher`: in-memory [`EventPublisher`](crate::core::traits::EventPublisher)
//! - `relay`: outbox relay and the notifier used by the engine

pub mod publisher;
pub mod relay;

pub use publisher::{InMemoryPublisher, PublishedMessage};
pub use relay::{EventRelay, Notifier};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{
    Account, AccountId, AccountStatus, PublishError, Transaction, TransactionId, TransactionType,
    UserId,
};

/// Topic announcing a newly opened account
pub const ACCOUNT_CREATED_TOPIC: &str = "account.created";

/// Topic announcing a committed deposit or transfer
pub const TRANSACTION_COMPLETED_TOPIC: &str = "transaction.completed";

/// Payload of [`ACCOUNT_CREATED_TOPIC`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountCreated {
    pub account_id: AccountId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub account_type: String,
    pub currency: String,
    pub status: AccountStatus,
}

/// Payload of [`TRANSACTION_COMPLETED_TOPIC`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionCompleted {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub created_at: DateTime<Utc>,
}

/// A notification about a committed ledger change
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    AccountCreated(AccountCreated),
    TransactionCompleted(TransactionCompleted),
}

impl LedgerEvent {
    pub fn account_created(account: &Account) -> Self {
        LedgerEvent::AccountCreated(AccountCreated {
            account_id: account.id,
            user_id: account.user_id,
            account_type: account.account_type.clone(),
            currency: account.currency.clone(),
            status: account.status,
        })
    }

    pub fn transaction_completed(transaction: &Transaction) -> Self {
        LedgerEvent::TransactionCompleted(TransactionCompleted {
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            from_account_id: transaction.from_account_id,
            to_account_id: transaction.to_account_id,
            amount: transaction.amount,
            tx_type: transaction.tx_type,
            created_at: transaction.created_at,
        })
    }

    pub fn topic(&self) -> &'static str {
        match self {
            LedgerEvent::AccountCreated(_) => ACCOUNT_CREATED_TOPIC,
            LedgerEvent::TransactionCompleted(_) => TRANSACTION_COMPLETED_TOPIC,
        }
    }

    /// Partition key: the id of the account or transaction the event is about
    pub fn key(&self) -> Vec<u8> {
        let id = match self {
            LedgerEvent::AccountCreated(event) => event.account_id,
            LedgerEvent::TransactionCompleted(event) => event.transaction_id,
        };
        id.to_string().into_bytes()
    }

    /// JSON-encoded body
    pub fn payload(&self) -> Result<Vec<u8>, PublishError> {
        let encoded = match self {
            LedgerEvent::AccountCreated(event) => serde_json::to_vec(event),
            LedgerEvent::TransactionCompleted(event) => serde_json::to_vec(event),
        };
        encoded.map_err(|e| PublishError::Encoding {
            message: e.to_string(),
        })
    }
}
