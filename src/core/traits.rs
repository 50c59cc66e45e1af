//! Core traits for persistence and event publishing
//!
//! This module defines the collaborator contracts the ledger is written
//! against. The ledger itself holds no storage: every backend is passed in
//! as an explicitly constructed handle.
//!
//! The stores are "dumb" persistence. Business rules live in the engine and
//! the transfer orchestrator, which compose multi-row atomicity through
//! [`UnitOfWork`].

use async_trait::async_trait;

use crate::types::{
    Account, AccountId, NewAccount, NewTransaction, PublishError, StoreError, Transaction,
    TransactionFilter, TransactionId, UserId,
};

/// Keyed storage of account records
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account only if it belongs to `owner`
    async fn get_by_owner_and_id(
        &self,
        owner: UserId,
        id: AccountId,
    ) -> Result<Account, StoreError>;

    /// Fetch an account regardless of owner
    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// All accounts of `owner`, ascending by id
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError>;

    /// Insert a new account and return it with its assigned id
    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Full-row update by identity, atomic per row
    ///
    /// Fails with [`StoreError::Conflict`] if the stored version differs
    /// from `account.version`.
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;
}

/// Append-only storage of transaction records
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Durably insert a transaction, assigning its id and timestamp
    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Matching transactions, newest first, paginated by the filter
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError>;
}

/// Rows written by a successful [`UnitOfWork::commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Committed {
    /// Saved accounts as stored, ascending by id
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

impl Committed {
    /// The written row of account `id`, if this commit saved it
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == id)
    }
}

/// An all-or-nothing batch of writes against the ledger store
///
/// Rows are locked with [`UnitOfWork::lock_account`] and stay locked until
/// the unit commits, rolls back, or is dropped. Writes are staged and only
/// become visible at [`UnitOfWork::commit`], which applies them in a single
/// atomic step. Dropping an unfinished unit rolls it back, so cancelling the
/// future that owns it never leaves partial state.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Take the exclusive lock on an account row and read it
    async fn lock_account(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Stage a full-row update of a previously locked account
    async fn save(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Stage a transaction insert
    async fn append(&mut self, transaction: NewTransaction) -> Result<(), StoreError>;

    /// Apply every staged write atomically and release the locks
    ///
    /// Returns the rows as written: saved accounts with their new versions
    /// and inserted transactions with their assigned ids, in the order they
    /// were appended.
    async fn commit(&mut self) -> Result<Committed, StoreError>;

    /// Discard staged writes and release the locks
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Backing store of the ledger: accounts, transaction log and units of work
/// over both
#[async_trait]
pub trait LedgerStore: AccountStore + TransactionLog {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// Topic-based notification channel
///
/// One attempt per call, no internal retry. Delivery guarantees beyond that
/// belong to the caller (see the event relay).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), PublishError>;
}
