//! Ledger engine
//!
//! This module provides the `LedgerEngine` that owns every single-account
//! balance mutation. It coordinates the ledger store and the notifier so a
//! deposit or a status change is applied as one unit of work and announced
//! only after it committed.
//!
//! The engine enforces business rules such as:
//! - Amounts are positive and expressible at the currency's minor unit
//! - Accounts are only visible to their owner
//! - Closed accounts accept no balance mutation
//! - Accounts close only at a zero balance
//!
//! # Deadlines
//!
//! Each call starts one [`Deadline`] from `LedgerConfig::operation_timeout`.
//! The lookups, the unit of work and the inline publish all draw on that
//! budget. Expiry before commit is a transient `Persistence` error with
//! nothing applied; expiry while publishing is a `PublishFailure` and the
//! change stays committed.

use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::LedgerConfig;
use crate::core::traits::{Committed, LedgerStore, UnitOfWork};
use crate::events::{LedgerEvent, Notifier};
use crate::types::{
    checked_credit, minor_units, to_currency_scale, Account, AccountId, AccountStatus,
    LedgerError, NewAccount, NewTransaction, PublishError, StoreError, Transaction,
    TransactionFilter, TransactionId, TransactionType, UserId,
};

/// Description recorded on every deposit
pub const DEPOSIT_DESCRIPTION: &str = "Account deposit";

/// Ledger engine
///
/// Stateless apart from its handles, so clones can serve concurrent
/// requests from many tasks.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    notifier: Notifier,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Create a new LedgerEngine
    ///
    /// # Arguments
    ///
    /// * `store` - Backing store for accounts and the transaction log
    /// * `notifier` - Announces committed changes
    /// * `config` - Deadlines and page sizes
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Notifier, config: LedgerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::start(self.config.operation_timeout)
    }

    /// Open a new account with a zero balance
    ///
    /// Inputs are trimmed and the currency is upper-cased.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The account type is empty (`Validation`)
    /// - The currency is not a three-letter alphabetic code (`Validation`)
    /// - The store fails or the deadline expires (`Persistence`)
    /// - The inline publish of `account.created` fails or runs past the
    ///   deadline (`PublishFailure`); the account exists regardless
    pub async fn create_account(
        &self,
        user_id: UserId,
        account_type: &str,
        currency: &str,
    ) -> Result<Account, LedgerError> {
        let account_type = account_type.trim();
        if account_type.is_empty() {
            return Err(LedgerError::validation("account_type", "must not be empty"));
        }

        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LedgerError::validation(
                "currency",
                format!("'{}' is not a three-letter code", currency),
            ));
        }

        let new_account = NewAccount {
            user_id,
            account_type: account_type.to_string(),
            balance: Decimal::new(0, minor_units(&currency)),
            currency,
            status: AccountStatus::Active,
        };
        let deadline = self.deadline();
        let account = deadline
            .run("create_account", async {
                self.store
                    .insert_account(new_account)
                    .await
                    .map_err(LedgerError::from)
            })
            .await?;

        tracing::info!(
            account_id = account.id,
            user_id,
            currency = %account.currency,
            "account created"
        );

        deadline
            .notify(&self.notifier, LedgerEvent::account_created(&account))
            .await?;
        Ok(account)
    }

    /// Credit an account with money entering from outside the ledger
    ///
    /// Returns the account as this deposit wrote it, and the deposit
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is not positive or not representable at the minor unit (`InvalidAmount`)
    /// - The account does not exist or belongs to another user (`NotFound`)
    /// - The account is closed (`AccountClosed`)
    /// - The balance would overflow (`InvalidAmount`)
    /// - The unit of work fails or the deadline expires before commit
    ///   (`Persistence`); nothing is applied
    /// - The inline publish fails (`PublishFailure`); the deposit stays committed
    pub async fn deposit(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
    ) -> Result<(Account, Transaction), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount, "must be positive"));
        }

        let deadline = self.deadline();
        let (account, transaction) = deadline
            .run("deposit", self.apply_deposit(user_id, account_id, amount))
            .await?;

        tracing::info!(
            transaction_id = transaction.id,
            account_id,
            amount = %transaction.amount,
            "deposit committed"
        );

        deadline
            .notify(&self.notifier, LedgerEvent::transaction_completed(&transaction))
            .await?;
        Ok((account, transaction))
    }

    async fn apply_deposit(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
    ) -> Result<(Account, Transaction), LedgerError> {
        let account = self.store.get_by_owner_and_id(user_id, account_id).await?;
        let amount = to_currency_scale(amount, &account.currency).ok_or_else(|| {
            LedgerError::invalid_amount(
                amount,
                format!("not representable at the {} minor unit", account.currency),
            )
        })?;

        let mut uow = self.store.begin().await?;
        match stage_deposit(uow.as_mut(), user_id, account_id, amount).await {
            Ok(staged) => {
                let (transaction, committed) = commit_one(uow.as_mut()).await?;
                let account = committed.account(account_id).cloned().unwrap_or(Account {
                    version: staged.version + 1,
                    ..staged
                });
                Ok((account, transaction))
            }
            Err(e) => {
                abort(uow.as_mut(), "deposit").await;
                Err(e)
            }
        }
    }

    /// Close an account
    ///
    /// Closing an account that is already closed succeeds without change.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The account does not exist or belongs to another user (`NotFound`)
    /// - The balance is not zero (`NonZeroBalance`)
    /// - The unit of work fails or the deadline expires (`Persistence`)
    pub async fn close_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<(), LedgerError> {
        let closed = self
            .deadline()
            .run("close_account", self.apply_close(user_id, account_id))
            .await?;

        if closed {
            tracing::info!(account_id, user_id, "account closed");
        } else {
            tracing::debug!(account_id, "account already closed");
        }
        Ok(())
    }

    /// Returns whether the status changed
    async fn apply_close(&self, user_id: UserId, account_id: AccountId) -> Result<bool, LedgerError> {
        self.store.get_by_owner_and_id(user_id, account_id).await?;

        let mut uow = self.store.begin().await?;
        match stage_close(uow.as_mut(), user_id, account_id).await {
            Ok(true) => {
                uow.commit().await?;
                Ok(true)
            }
            Ok(false) => {
                abort(uow.as_mut(), "close_account").await;
                Ok(false)
            }
            Err(e) => {
                abort(uow.as_mut(), "close_account").await;
                Err(e)
            }
        }
    }

    /// All accounts of a user, ascending by id
    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, LedgerError> {
        self.deadline()
            .run("list_accounts", async {
                self.store
                    .list_by_owner(user_id)
                    .await
                    .map_err(LedgerError::from)
            })
            .await
    }

    /// A single account, only if owned by `user_id`
    pub async fn get_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Account, LedgerError> {
        self.deadline()
            .run("get_account", async {
                self.store
                    .get_by_owner_and_id(user_id, account_id)
                    .await
                    .map_err(LedgerError::from)
            })
            .await
    }

    /// Page of transactions initiated by the filter's user, newest first
    ///
    /// Page 0 is read as page 1; the limit is replaced by the configured
    /// default when 0 and clamped to the configured maximum.
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let filter = TransactionFilter {
            page: filter.page.max(1),
            limit: self.config.page_limit(filter.limit),
            ..filter
        };
        self.deadline()
            .run("list_transactions", async {
                self.store.query(&filter).await.map_err(LedgerError::from)
            })
            .await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.deadline()
            .run("get_transaction", async {
                self.store
                    .get_transaction(id)
                    .await
                    .map_err(LedgerError::from)
            })
            .await
    }
}

/// Returns the staged row
async fn stage_deposit(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    account_id: AccountId,
    amount: Decimal,
) -> Result<Account, LedgerError> {
    let mut account = uow.lock_account(account_id).await?;
    if account.user_id != user_id {
        return Err(LedgerError::account_not_found(account_id));
    }
    if !account.is_active() {
        return Err(LedgerError::account_closed(account_id));
    }

    account.balance = checked_credit(account.balance, amount)
        .ok_or_else(|| LedgerError::invalid_amount(amount, "balance would overflow"))?;
    uow.save(&account).await?;

    uow.append(NewTransaction {
        user_id,
        from_account_id: None,
        to_account_id: account_id,
        amount,
        description: DEPOSIT_DESCRIPTION.to_string(),
        tx_type: TransactionType::Deposit,
    })
    .await?;
    Ok(account)
}

async fn stage_close(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    account_id: AccountId,
) -> Result<bool, LedgerError> {
    let mut account = uow.lock_account(account_id).await?;
    if account.user_id != user_id {
        return Err(LedgerError::account_not_found(account_id));
    }
    if account.status == AccountStatus::Closed {
        return Ok(false);
    }
    if !account.balance.is_zero() {
        return Err(LedgerError::non_zero_balance(account_id, account.balance));
    }

    account.status = AccountStatus::Closed;
    uow.save(&account).await?;
    Ok(true)
}

/// Commit a unit of work that staged exactly one transaction
///
/// Returns that transaction and the rest of what the commit wrote.
pub(crate) async fn commit_one(
    uow: &mut dyn UnitOfWork,
) -> Result<(Transaction, Committed), LedgerError> {
    let mut committed = uow.commit().await?;
    let transaction = committed.transactions.pop().ok_or_else(|| {
        LedgerError::from(StoreError::unavailable("commit returned no transaction"))
    })?;
    Ok((transaction, committed))
}

/// Roll back after a failed staging step
///
/// A failing rollback is only logged: the unit's locks are released when it
/// is dropped either way, and the caller already holds the error that
/// matters.
pub(crate) async fn abort(uow: &mut dyn UnitOfWork, operation: &'static str) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!(operation, error = %e, "rollback failed");
    }
}

/// Time budget of one ledger call
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    limit: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Start the clock; `None` never expires
    pub(crate) fn start(limit: Option<Duration>) -> Self {
        Self {
            limit,
            expires_at: limit.map(|limit| Instant::now() + limit),
        }
    }

    fn millis(&self) -> u64 {
        self.limit
            .map_or(0, |limit| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
    }

    /// Run store work within the remaining budget
    ///
    /// On expiry `work` is dropped, which rolls back whatever unit of work
    /// it owned, and a transient `Persistence` error is returned.
    pub(crate) async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let Some(expires_at) = self.expires_at else {
            return work.await;
        };

        match tokio::time::timeout_at(expires_at, work).await {
            Ok(result) => result,
            Err(_) => {
                let millis = self.millis();
                tracing::warn!(operation, timeout_ms = millis, "operation deadline exceeded");
                Err(StoreError::Timeout { millis }.into())
            }
        }
    }

    /// Announce a committed change within the remaining budget
    ///
    /// Expiry surfaces as `PublishFailure`; the change stays committed.
    pub(crate) async fn notify(
        &self,
        notifier: &Notifier,
        event: LedgerEvent,
    ) -> Result<(), LedgerError> {
        let Some(expires_at) = self.expires_at else {
            return notifier.notify(event).await;
        };

        let topic = event.topic();
        match tokio::time::timeout_at(expires_at, notifier.notify(event)).await {
            Ok(result) => result,
            Err(_) => {
                let millis = self.millis();
                tracing::warn!(topic, timeout_ms = millis, "publish deadline exceeded after commit");
                Err(LedgerError::publish_failure(
                    topic,
                    PublishError::Timeout { millis },
                ))
            }
        }
    }
}
