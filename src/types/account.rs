//! Account-related types for the ledger
//!
//! This module defines the Account record and its lifecycle status.
//! Accounts are never deleted: closing an account is a status change
//! that preserves the audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Owning user identifier
pub type UserId = u64;

/// Account identifier, assigned by the store at insertion
pub type AccountId = u64;

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Open for deposits and transfers
    Active,

    /// Terminal state; the balance is zero and no mutation is accepted
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted account record
///
/// `balance` is held at exactly the currency's minor-unit scale and is
/// only ever written by the ledger engine and the transfer orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,

    /// Product type, e.g. "deposit" or "savings"
    #[serde(rename = "type")]
    pub account_type: String,

    /// Upper-case three-letter currency code
    pub currency: String,

    pub balance: Decimal,
    pub status: AccountStatus,

    /// Row version, bumped by the store on every persisted change
    ///
    /// Units of work compare it at commit time so a row written outside
    /// the lock cannot be silently overwritten.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Account data supplied at creation time; the store assigns identity
/// and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub user_id: UserId,
    pub account_type: String,
    pub currency: String,
    pub balance: Decimal,
    pub status: AccountStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AccountStatus::Closed).unwrap(),
            "\"closed\""
        );
        assert_eq!(AccountStatus::Active.to_string(), "active");
    }
}
