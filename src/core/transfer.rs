//! Transfer orchestration
//!
//! This module provides the `TransferOrchestrator`, which moves money
//! between two accounts as a single unit of work.
//!
//! # Lock ordering
//!
//! Both account rows are locked in ascending id order regardless of the
//! transfer direction. Two transfers in opposite directions between the
//! same pair therefore queue on the same first lock instead of each holding
//! one row and waiting for the other.
//!
//! # Rollback
//!
//! The debit, the credit and the transaction row are staged and committed
//! together. Any failure before or during commit leaves both balances and
//! the log untouched.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::core::engine::{abort, commit_one, Deadline};
use crate::core::traits::{LedgerStore, UnitOfWork};
use crate::events::{LedgerEvent, Notifier};
use crate::types::{
    checked_credit, to_currency_scale, Account, AccountId, LedgerError, NewTransaction, Transaction,
    TransferKind, TransferRequest,
};

/// Two-account transfer coordinator
#[derive(Clone)]
pub struct TransferOrchestrator {
    store: Arc<dyn LedgerStore>,
    notifier: Notifier,
    config: LedgerConfig,
}

impl TransferOrchestrator {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Notifier, config: LedgerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Move `request.amount` from the source to the destination account
    ///
    /// The source must belong to the caller. For internal transfers the
    /// destination must too; external transfers may credit any user's
    /// account.
    ///
    /// # Returns
    ///
    /// The committed transaction, typed after the transfer kind
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The amount is not positive, finer than the minor unit, the accounts
    ///   are the same, or their currencies differ (`InvalidRequest`)
    /// - Either account is missing or not visible to the caller (`NotFound`)
    /// - Either account is closed (`AccountClosed`)
    /// - The source balance is below the amount (`InsufficientFunds`)
    /// - The unit of work fails or times out (`Persistence`)
    /// - The inline publish fails (`PublishFailure`); the transfer stays committed
    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_request("amount must be positive"));
        }
        if request.from_account_id == request.to_account_id {
            return Err(LedgerError::invalid_request(
                "cannot transfer to the same account",
            ));
        }

        let deadline = Deadline::start(self.config.operation_timeout);
        let transaction = deadline
            .run("transfer", self.execute(&request))
            .await
            .inspect_err(|e| {
                tracing::debug!(
                    from = request.from_account_id,
                    to = request.to_account_id,
                    error = %e,
                    "transfer rejected"
                );
            })?;

        tracing::info!(
            transaction_id = transaction.id,
            from = request.from_account_id,
            to = request.to_account_id,
            amount = %transaction.amount,
            kind = %transaction.tx_type,
            "transfer committed"
        );

        deadline
            .notify(&self.notifier, LedgerEvent::transaction_completed(&transaction))
            .await?;
        Ok(transaction)
    }

    async fn execute(&self, request: &TransferRequest) -> Result<Transaction, LedgerError> {
        let source = self
            .store
            .get_by_owner_and_id(request.user_id, request.from_account_id)
            .await?;
        let destination = match request.kind {
            TransferKind::Internal => {
                self.store
                    .get_by_owner_and_id(request.user_id, request.to_account_id)
                    .await?
            }
            TransferKind::External => self.store.get_account(request.to_account_id).await?,
        };

        if source.currency != destination.currency {
            return Err(LedgerError::invalid_request(format!(
                "currency mismatch: {} to {}",
                source.currency, destination.currency
            )));
        }
        let amount = to_currency_scale(request.amount, &source.currency).ok_or_else(|| {
            LedgerError::invalid_request(format!(
                "amount {} is not representable at the {} minor unit",
                request.amount, source.currency
            ))
        })?;

        let mut uow = self.store.begin().await?;
        match stage_transfer(uow.as_mut(), request, amount).await {
            Ok(()) => commit_one(uow.as_mut())
                .await
                .map(|(transaction, _)| transaction),
            Err(e) => {
                abort(uow.as_mut(), "transfer").await;
                Err(e)
            }
        }
    }
}

async fn stage_transfer(
    uow: &mut dyn UnitOfWork,
    request: &TransferRequest,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let (mut source, mut destination) =
        lock_pair(uow, request.from_account_id, request.to_account_id).await?;

    // Balances may have moved since the unlocked lookup
    if !source.is_active() {
        return Err(LedgerError::account_closed(source.id));
    }
    if source.balance < amount {
        return Err(LedgerError::insufficient_funds(
            source.id,
            source.balance,
            amount,
        ));
    }
    if !destination.is_active() {
        return Err(LedgerError::account_closed(destination.id));
    }

    source.balance = source
        .balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::invalid_request("source balance would underflow"))?;
    destination.balance = checked_credit(destination.balance, amount)
        .ok_or_else(|| LedgerError::invalid_request("destination balance would overflow"))?;

    uow.save(&source).await?;
    uow.save(&destination).await?;
    uow.append(NewTransaction {
        user_id: request.user_id,
        from_account_id: Some(source.id),
        to_account_id: destination.id,
        amount,
        description: request.description.clone(),
        tx_type: request.kind.into(),
    })
    .await?;
    Ok(())
}

/// Lock two distinct rows in ascending id order
///
/// Returns them in the order they were asked for: `(from, to)`.
pub(crate) async fn lock_pair(
    uow: &mut dyn UnitOfWork,
    from: AccountId,
    to: AccountId,
) -> Result<(Account, Account), LedgerError> {
    if from < to {
        let first = uow.lock_account(from).await?;
        let second = uow.lock_account(to).await?;
        Ok((first, second))
    } else {
        let first = uow.lock_account(to).await?;
        let second = uow.lock_account(from).await?;
        Ok((second, first))
    }
}
