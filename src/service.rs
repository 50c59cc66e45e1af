//! Ledger service
//!
//! `LedgerService` is the inbound surface of the ledger. It wires the
//! engine and the transfer orchestrator to a store, a publisher and a
//! configuration, and owns the event relay when publishing is deferred.
//!
//! # Architecture
//!
//! ```text
//! LedgerService
//!     ├── LedgerEngine          (accounts, deposits, queries)
//!     ├── TransferOrchestrator  (two-account transfers)
//!     └── EventRelay            (deferred mode only)
//! ```

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{LedgerConfig, PublishMode};
use crate::core::traits::{EventPublisher, LedgerStore};
use crate::core::{LedgerEngine, TransferOrchestrator};
use crate::events::{EventRelay, LedgerEvent, Notifier};
use crate::types::{
    Account, AccountId, LedgerError, Transaction, TransactionFilter, TransactionId,
    TransferRequest, UserId,
};

/// Facade over the ledger engine and transfer orchestrator
pub struct LedgerService {
    engine: LedgerEngine,
    transfers: TransferOrchestrator,
    relay: Option<EventRelay>,
}

impl LedgerService {
    /// Build a service over the given collaborators
    ///
    /// # Panics
    ///
    /// In deferred publish mode the event relay is spawned on the current
    /// Tokio runtime, so this must be called from within one.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        config: LedgerConfig,
    ) -> Self {
        let (notifier, relay) = match config.publish_mode {
            PublishMode::Inline => (Notifier::inline(publisher), None),
            PublishMode::Deferred => {
                let relay = EventRelay::spawn(publisher, config.relay.clone());
                (relay.notifier(), Some(relay))
            }
        };
        tracing::debug!(mode = ?config.publish_mode, "ledger service started");

        Self {
            engine: LedgerEngine::new(Arc::clone(&store), notifier.clone(), config.clone()),
            transfers: TransferOrchestrator::new(store, notifier, config),
            relay,
        }
    }

    pub async fn create_account(
        &self,
        user_id: UserId,
        account_type: &str,
        currency: &str,
    ) -> Result<Account, LedgerError> {
        self.engine
            .create_account(user_id, account_type, currency)
            .await
    }

    pub async fn deposit(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
    ) -> Result<(Account, Transaction), LedgerError> {
        self.engine.deposit(user_id, account_id, amount).await
    }

    pub async fn close_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<(), LedgerError> {
        self.engine.close_account(user_id, account_id).await
    }

    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, LedgerError> {
        self.transfers.transfer(request).await
    }

    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, LedgerError> {
        self.engine.list_accounts(user_id).await
    }

    pub async fn get_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Account, LedgerError> {
        self.engine.get_account(user_id, account_id).await
    }

    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.engine.list_transactions(filter).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.engine.get_transaction(id).await
    }

    /// Wait until every event announced so far has been published or
    /// dead-lettered. No-op in inline mode.
    pub async fn flush_events(&self) {
        if let Some(relay) = &self.relay {
            relay.flush().await;
        }
    }

    /// Events the relay gave up on
    pub fn dead_letters(&self) -> Vec<LedgerEvent> {
        self.relay
            .as_ref()
            .map(EventRelay::dead_letters)
            .unwrap_or_default()
    }

    /// Remove the dead letters collected so far, leaving the relay's list empty
    pub fn take_dead_letters(&self) -> Vec<LedgerEvent> {
        self.relay
            .as_ref()
            .map(EventRelay::take_dead_letters)
            .unwrap_or_default()
    }

    /// Drain pending events and stop the relay
    ///
    /// # Returns
    ///
    /// The events that could not be published
    pub async fn shutdown(self) -> Vec<LedgerEvent> {
        match self.relay {
            Some(relay) => relay.shutdown().await,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryStore;
    use crate::events::{InMemoryPublisher, ACCOUNT_CREATED_TOPIC, TRANSACTION_COMPLETED_TOPIC};
    use crate::config::RelayConfig;
    use crate::types::TransferKind;
    use std::time::Duration;

    fn service(mode: PublishMode) -> (LedgerService, Arc<InMemoryPublisher>) {
        let publisher = Arc::new(InMemoryPublisher::new());
        let config = LedgerConfig {
            publish_mode: mode,
            ..LedgerConfig::default()
        };
        let service = LedgerService::new(Arc::new(MemoryStore::new()), publisher.clone(), config);
        (service, publisher)
    }

    #[tokio::test]
    async fn test_deferred_mode_publishes_after_flush() {
        let (service, publisher) = service(PublishMode::Deferred);

        let a = service.create_account(1, "deposit", "USD").await.unwrap();
        let b = service.create_account(1, "deposit", "USD").await.unwrap();
        service.deposit(1, a.id, Decimal::new(10000, 2)).await.unwrap();
        service
            .transfer(TransferRequest {
                user_id: 1,
                from_account_id: a.id,
                to_account_id: b.id,
                amount: Decimal::new(4000, 2),
                description: "savings".to_string(),
                kind: TransferKind::Internal,
            })
            .await
            .unwrap();
        service.flush_events().await;

        assert_eq!(publisher.published_on(ACCOUNT_CREATED_TOPIC).len(), 2);
        assert_eq!(publisher.published_on(TRANSACTION_COMPLETED_TOPIC).len(), 2);
        assert!(service.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_mode_succeeds_while_bus_is_down() {
        let (service, publisher) = service(PublishMode::Deferred);
        publisher.set_online(false);

        let account = service.create_account(1, "deposit", "USD").await.unwrap();
        let (updated, _) = service
            .deposit(1, account.id, Decimal::new(500, 2))
            .await
            .unwrap();
        assert_eq!(updated.balance, Decimal::new(500, 2));

        publisher.set_online(true);
        service.flush_events().await;
        assert_eq!(publisher.published().len(), 2);
        assert!(service.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_inline_mode_has_nothing_to_drain() {
        let (service, publisher) = service(PublishMode::Inline);

        service.create_account(7, "savings", "JPY").await.unwrap();
        assert_eq!(publisher.published().len(), 1);

        service.flush_events().await;
        assert!(service.dead_letters().is_empty());
        assert!(service.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_take_dead_letters_leaves_none_behind() {
        let publisher = Arc::new(InMemoryPublisher::new());
        let config = LedgerConfig {
            publish_mode: PublishMode::Deferred,
            relay: RelayConfig::new(1, Duration::from_millis(1), Duration::from_millis(1)),
            ..LedgerConfig::default()
        };
        let service = LedgerService::new(Arc::new(MemoryStore::new()), publisher.clone(), config);
        publisher.set_online(false);

        service.create_account(1, "deposit", "USD").await.unwrap();
        service.create_account(1, "savings", "USD").await.unwrap();
        service.flush_events().await;

        let taken = service.take_dead_letters();
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|e| e.topic() == ACCOUNT_CREATED_TOPIC));
        assert!(service.dead_letters().is_empty());
        assert!(service.shutdown().await.is_empty());
    }
}
