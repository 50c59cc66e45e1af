//! In-memory ledger store
//!
//! This module provides `MemoryStore`, a thread-safe implementation of the
//! account store, the transaction log and their unit of work.
//!
//! # Design
//!
//! Both tables live behind a single `RwLock` so a commit can apply all of its
//! staged writes in one step: readers see either none or all of them. Row
//! locks are separate per-account async mutexes kept in a `DashMap`, which
//! lets a unit of work hold an account across `.await` points without
//! blocking unrelated accounts.
//!
//! The table lock is never held across an `.await`, and commit performs no
//! `.await` at all, so cancelling a unit of work can only ever discard it.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::traits::{AccountStore, Committed, LedgerStore, TransactionLog, UnitOfWork};
use crate::types::{
    Account, AccountId, EntityKind, NewAccount, NewTransaction, StoreError, Transaction,
    TransactionFilter, TransactionId, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,

    /// Append-only; the transaction with id `n` sits at index `n - 1`
    transactions: Vec<Transaction>,
}

impl Tables {
    fn account(&self, id: AccountId) -> Result<&Account, StoreError> {
        self.accounts
            .get(&id)
            .ok_or_else(|| StoreError::account_not_found(id))
    }

    fn check_version(&self, id: AccountId, expected: u64) -> Result<(), StoreError> {
        let found = self.account(id)?.version;
        if found != expected {
            return Err(StoreError::Conflict {
                account: id,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn write_account(&mut self, account: &Account) -> Account {
        let mut row = account.clone();
        row.version += 1;
        row.updated_at = Utc::now();
        self.accounts.insert(row.id, row.clone());
        row
    }

    fn append_transaction(&mut self, new: NewTransaction) -> Transaction {
        let transaction = Transaction {
            id: self.transactions.len() as TransactionId + 1,
            user_id: new.user_id,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            amount: new.amount,
            description: new.description,
            tx_type: new.tx_type,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        transaction
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::unavailable("ledger tables lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::unavailable("ledger tables lock poisoned"))
    }

    fn row_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        let entry = self.row_locks.entry(id).or_default();
        Arc::clone(entry.value())
    }

    /// Lock an existing account row, waiting for any current holder
    async fn lock_row(&self, id: AccountId) -> Result<OwnedMutexGuard<()>, StoreError> {
        // Refuse unknown ids before creating a lock entry for them
        self.read()?.account(id)?;
        Ok(self.row_lock(id).lock_owned().await)
    }
}

/// Thread-safe in-memory implementation of [`LedgerStore`]
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every account, ascending by id
    pub fn all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.shared.read()?.accounts.values().cloned().collect())
    }

    /// Number of rows in the transaction log
    pub fn transaction_count(&self) -> Result<usize, StoreError> {
        Ok(self.shared.read()?.transactions.len())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_by_owner_and_id(
        &self,
        owner: UserId,
        id: AccountId,
    ) -> Result<Account, StoreError> {
        let tables = self.shared.read()?;
        match tables.accounts.get(&id) {
            Some(account) if account.user_id == owner => Ok(account.clone()),
            _ => Err(StoreError::account_not_found(id)),
        }
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        Ok(self.shared.read()?.account(id)?.clone())
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .shared
            .read()?
            .accounts
            .values()
            .filter(|account| account.user_id == owner)
            .cloned()
            .collect())
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.shared.write()?;
        let id = tables.accounts.keys().next_back().map_or(1, |last| last + 1);
        let now = Utc::now();
        let row = Account {
            id,
            user_id: account.user_id,
            account_type: account.account_type,
            currency: account.currency,
            balance: account.balance,
            status: account.status,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(id, row.clone());
        Ok(row)
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let _row = self.shared.lock_row(account.id).await?;
        let mut tables = self.shared.write()?;
        tables.check_version(account.id, account.version)?;
        tables.write_account(account);
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for MemoryStore {
    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        Ok(self.shared.write()?.append_transaction(transaction))
    }

    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.shared.read()?;
        let mut matching: Vec<&Transaction> = tables
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let limit = if filter.limit == 0 {
            usize::MAX
        } else {
            filter.limit as usize
        };
        Ok(matching
            .into_iter()
            .skip(filter.offset())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        let tables = self.shared.read()?;
        id.checked_sub(1)
            .and_then(|index| tables.transactions.get(index as usize))
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: EntityKind::Transaction,
                id,
            })
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork::new(Arc::clone(&self.shared))))
    }
}

/// A row lock held by a unit of work, with the version read under it
#[derive(Debug)]
struct HeldRow {
    _guard: OwnedMutexGuard<()>,
    version: u64,
}

/// Unit of work over a [`MemoryStore`]
///
/// Locks are released when the unit commits, rolls back or is dropped.
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    held: BTreeMap<AccountId, HeldRow>,
    staged_accounts: BTreeMap<AccountId, Account>,
    staged_transactions: Vec<NewTransaction>,
    finished: bool,
}

impl MemoryUnitOfWork {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            held: BTreeMap::new(),
            staged_accounts: BTreeMap::new(),
            staged_transactions: Vec::new(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.staged_accounts.clear();
        self.staged_transactions.clear();
        self.held.clear();
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.ensure_open()?;

        if self.held.contains_key(&id) {
            if let Some(staged) = self.staged_accounts.get(&id) {
                return Ok(staged.clone());
            }
            return Ok(self.shared.read()?.account(id)?.clone());
        }

        let guard = self.shared.lock_row(id).await?;
        let account = self.shared.read()?.account(id)?.clone();
        self.held.insert(
            id,
            HeldRow {
                _guard: guard,
                version: account.version,
            },
        );
        Ok(account)
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.held.contains_key(&account.id) {
            return Err(StoreError::NotLocked {
                account: account.id,
            });
        }
        self.staged_accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn append(&mut self, transaction: NewTransaction) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.staged_transactions.push(transaction);
        Ok(())
    }

    async fn commit(&mut self) -> Result<Committed, StoreError> {
        self.ensure_open()?;

        let result = {
            let mut tables = self.shared.write()?;
            let verified: Result<(), StoreError> = self.held.iter().try_for_each(|(id, row)| {
                if self.staged_accounts.contains_key(id) {
                    tables.check_version(*id, row.version)
                } else {
                    Ok(())
                }
            });

            verified.map(|()| {
                let accounts = self
                    .staged_accounts
                    .values()
                    .map(|account| {
                        let mut row = account.clone();
                        row.version = self.held[&account.id].version;
                        tables.write_account(&row)
                    })
                    .collect();
                let transactions = self
                    .staged_transactions
                    .drain(..)
                    .map(|tx| tables.append_transaction(tx))
                    .collect();
                Committed {
                    accounts,
                    transactions,
                }
            })
        };

        self.finish();
        result
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, TransactionType};
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn new_account(user_id: UserId) -> NewAccount {
        NewAccount {
            user_id,
            account_type: "deposit".to_string(),
            currency: "RUB".to_string(),
            balance: Decimal::new(0, 2),
            status: AccountStatus::Active,
        }
    }

    fn deposit_of(to: AccountId, amount: Decimal) -> NewTransaction {
        NewTransaction {
            user_id: 1,
            from_account_id: None,
            to_account_id: to,
            amount,
            description: "test".to_string(),
            tx_type: TransactionType::Deposit,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryStore::new();

        let first = store.insert_account(new_account(1)).await.unwrap();
        let second = store.insert_account(new_account(2)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.version, 0);
    }

    #[tokio::test]
    async fn test_get_by_owner_hides_foreign_accounts() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        assert!(store.get_by_owner_and_id(1, account.id).await.is_ok());
        assert_eq!(
            store.get_by_owner_and_id(2, account.id).await,
            Err(StoreError::account_not_found(account.id))
        );
        assert!(store.get_account(account.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_by_owner_filters_and_orders() {
        let store = MemoryStore::new();
        store.insert_account(new_account(1)).await.unwrap();
        store.insert_account(new_account(2)).await.unwrap();
        store.insert_account(new_account(1)).await.unwrap();

        let ids: Vec<AccountId> = store
            .list_by_owner(1)
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_save_bumps_version_and_rejects_stale_rows() {
        let store = MemoryStore::new();
        let mut account = store.insert_account(new_account(1)).await.unwrap();

        account.account_type = "savings".to_string();
        store.save_account(&account).await.unwrap();

        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.account_type, "savings");

        // `account` still carries version 0
        let result = store.save_account(&account).await;
        assert_eq!(
            result,
            Err(StoreError::Conflict {
                account: account.id,
                expected: 0,
                found: 1
            })
        );
    }

    #[tokio::test]
    async fn test_commit_applies_all_staged_writes() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let mut locked = uow.lock_account(account.id).await.unwrap();
        locked.balance = Decimal::new(10000, 2);
        uow.save(&locked).await.unwrap();
        uow.append(deposit_of(account.id, Decimal::new(10000, 2)))
            .await
            .unwrap();

        // Nothing visible before commit
        assert_eq!(
            store.get_account(account.id).await.unwrap().balance,
            Decimal::ZERO
        );
        assert_eq!(store.transaction_count().unwrap(), 0);

        let committed = uow.commit().await.unwrap();
        assert_eq!(committed.transactions.len(), 1);
        assert_eq!(committed.transactions[0].id, 1);

        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.balance, Decimal::new(10000, 2));
        assert_eq!(stored.version, 1);
        assert_eq!(committed.account(account.id), Some(&stored));
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes_and_releases_lock() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            let mut locked = uow.lock_account(account.id).await.unwrap();
            locked.balance = Decimal::new(500, 2);
            uow.save(&locked).await.unwrap();
            uow.append(deposit_of(account.id, Decimal::new(500, 2)))
                .await
                .unwrap();
        }

        assert_eq!(
            store.get_account(account.id).await.unwrap().balance,
            Decimal::ZERO
        );
        assert_eq!(store.transaction_count().unwrap(), 0);

        // The row lock must be free again
        let mut uow = store.begin().await.unwrap();
        let relock = tokio::time::timeout(Duration::from_secs(1), uow.lock_account(account.id)).await;
        assert!(relock.is_ok());
    }

    #[tokio::test]
    async fn test_commit_detects_write_outside_lock() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let mut locked = uow.lock_account(account.id).await.unwrap();

        // Bypass the unit's lock by writing the table directly
        store.shared.write().unwrap().write_account(&account);

        locked.balance = Decimal::ONE;
        uow.save(&locked).await.unwrap();
        let result = uow.commit().await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_requires_lock() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.save(&account).await,
            Err(StoreError::NotLocked { account: account.id })
        );
    }

    #[tokio::test]
    async fn test_finished_unit_of_work_is_closed() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(uow.commit().await, Err(StoreError::Closed));
        assert_eq!(uow.lock_account(1).await, Err(StoreError::Closed));
    }

    #[tokio::test]
    async fn test_lock_unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();

        assert_eq!(
            uow.lock_account(99).await,
            Err(StoreError::account_not_found(99))
        );
    }

    #[tokio::test]
    async fn test_query_orders_newest_first_and_paginates() {
        let store = MemoryStore::new();
        for cents in 1..=5 {
            store
                .insert_transaction(deposit_of(1, Decimal::new(cents, 2)))
                .await
                .unwrap();
        }

        let page = store
            .query(&TransactionFilter {
                page: 2,
                limit: 2,
                ..TransactionFilter::for_user(1)
            })
            .await
            .unwrap();
        let ids: Vec<TransactionId> = page.iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let all = store.query(&TransactionFilter::for_user(1)).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, 5);
    }

    #[tokio::test]
    async fn test_get_transaction_by_id() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_transaction(deposit_of(1, Decimal::ONE))
            .await
            .unwrap();

        assert_eq!(store.get_transaction(inserted.id).await.unwrap(), inserted);
        assert!(matches!(
            store.get_transaction(0).await,
            Err(StoreError::NotFound {
                entity: EntityKind::Transaction,
                ..
            })
        ));
        assert!(store.get_transaction(2).await.is_err());
    }

    #[tokio::test]
    async fn test_row_lock_serializes_units_of_work() {
        let store = MemoryStore::new();
        let account = store.insert_account(new_account(1)).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_account(account.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), second.lock_account(account.id)).await;
        assert!(blocked.is_err(), "second unit must wait for the row lock");

        first.rollback().await.unwrap();
        let acquired =
            tokio::time::timeout(Duration::from_secs(1), second.lock_account(account.id)).await;
        assert!(acquired.is_ok());
    }
}
