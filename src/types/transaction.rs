//! Transaction-related types for the ledger
//!
//! This module defines transaction types, the immutable transaction
//! record written to the log, and the filter used to query it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::{AccountId, UserId};

/// Transaction identifier, assigned by the log at durable insertion
pub type TransactionId = u64;

/// Transaction types recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Transfer between two accounts of the same owner
    Internal,

    /// Transfer to an account that may belong to another owner
    External,

    /// Credit from outside the ledger; the source account is absent
    Deposit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Internal => "internal",
            TransactionType::External => "external",
            TransactionType::Deposit => "deposit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer kind supplied by the calling context
///
/// Both kinds share the same balance and invariant rules; the kind is
/// stored verbatim as the transaction type and decides whether the
/// destination must belong to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Internal,
    External,
}

impl From<TransferKind> for TransactionType {
    fn from(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Internal => TransactionType::Internal,
            TransferKind::External => TransactionType::External,
        }
    }
}

/// A request to move money between two accounts
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// Caller; must own the source account
    pub user_id: UserId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub description: String,
    pub kind: TransferKind,
}

/// Immutable transaction record
///
/// Written exactly once per completed money movement and never updated
/// or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,

    /// User that initiated the movement
    pub user_id: UserId,

    /// Source account; `None` for money entering from outside the ledger
    pub from_account_id: Option<AccountId>,

    pub to_account_id: AccountId,

    /// Always positive, at the currency's minor-unit scale
    pub amount: Decimal,

    pub description: String,

    #[serde(rename = "type")]
    pub tx_type: TransactionType,

    pub created_at: DateTime<Utc>,
}

/// Transaction data staged for insertion; the log assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub description: String,
    pub tx_type: TransactionType,
}

/// Query over the transaction log
///
/// All bounds are inclusive. `page` is 1-based; the ledger normalizes
/// `page` and `limit` before the filter reaches a store.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub user_id: UserId,
    pub tx_type: Option<TransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub page: u32,
    pub limit: u32,
}

impl TransactionFilter {
    /// Filter matching every transaction of `user_id`, first page,
    /// default page size
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            tx_type: None,
            from: None,
            to: None,
            min_amount: None,
            max_amount: None,
            page: 1,
            limit: 0,
        }
    }

    /// Check whether a transaction satisfies every bound of this filter
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.user_id == self.user_id
            && self.tx_type.map_or(true, |t| tx.tx_type == t)
            && self.from.map_or(true, |from| tx.created_at >= from)
            && self.to.map_or(true, |to| tx.created_at <= to)
            && self.min_amount.map_or(true, |min| tx.amount >= min)
            && self.max_amount.map_or(true, |max| tx.amount <= max)
    }

    /// Number of records to skip for the current page
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn sample(amount: Decimal, tx_type: TransactionType) -> Transaction {
        Transaction {
            id: 1,
            user_id: 7,
            from_account_id: None,
            to_account_id: 3,
            amount,
            description: String::new(),
            tx_type,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_for_user_matches_everything_of_owner() {
        let filter = TransactionFilter::for_user(7);
        assert!(filter.matches(&sample(Decimal::new(100, 2), TransactionType::Deposit)));

        let other = TransactionFilter::for_user(8);
        assert!(!other.matches(&sample(Decimal::new(100, 2), TransactionType::Deposit)));
    }

    #[rstest]
    #[case::type_match(Some(TransactionType::Deposit), None, None, true)]
    #[case::type_mismatch(Some(TransactionType::Internal), None, None, false)]
    #[case::min_inclusive(None, Some(Decimal::new(500, 2)), None, true)]
    #[case::min_excludes(None, Some(Decimal::new(501, 2)), None, false)]
    #[case::max_inclusive(None, None, Some(Decimal::new(500, 2)), true)]
    #[case::max_excludes(None, None, Some(Decimal::new(499, 2)), false)]
    fn test_filter_bounds(
        #[case] tx_type: Option<TransactionType>,
        #[case] min_amount: Option<Decimal>,
        #[case] max_amount: Option<Decimal>,
        #[case] expected: bool,
    ) {
        let filter = TransactionFilter {
            tx_type,
            min_amount,
            max_amount,
            ..TransactionFilter::for_user(7)
        };
        assert_eq!(
            filter.matches(&sample(Decimal::new(500, 2), TransactionType::Deposit)),
            expected
        );
    }

    #[test]
    fn test_filter_date_range() {
        let tx = sample(Decimal::ONE, TransactionType::External);
        let filter = TransactionFilter {
            from: Some(tx.created_at - Duration::seconds(1)),
            to: Some(tx.created_at),
            ..TransactionFilter::for_user(7)
        };
        assert!(filter.matches(&tx));

        let later = TransactionFilter {
            from: Some(tx.created_at + Duration::seconds(1)),
            ..TransactionFilter::for_user(7)
        };
        assert!(!later.matches(&tx));
    }

    #[rstest]
    #[case(1, 20, 0)]
    #[case(3, 20, 40)]
    #[case(0, 10, 0)]
    fn test_offset(#[case] page: u32, #[case] limit: u32, #[case] expected: usize) {
        let filter = TransactionFilter {
            page,
            limit,
            ..TransactionFilter::for_user(1)
        };
        assert_eq!(filter.offset(), expected);
    }

    #[test]
    fn test_transfer_kind_maps_to_transaction_type() {
        assert_eq!(
            TransactionType::from(TransferKind::External),
            TransactionType::External
        );
        assert_eq!(TransactionType::Internal.to_string(), "internal");
    }
}
