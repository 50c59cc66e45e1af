//! Event relay and notifier
//!
//! The ledger never publishes from inside a unit of work. After commit it
//! hands the event to a [`Notifier`], which either publishes inline or
//! enqueues it on the outbox drained by an [`EventRelay`].
//!
//! # Relay
//!
//! ```text
//! engine / orchestrator ──enqueue──▶ outbox (mpsc) ──▶ relay task ──▶ EventPublisher
//!                                                        │ retry with backoff
//!                                                        └─▶ dead letters
//! ```
//!
//! The relay task processes messages in FIFO order, so a flush marker is
//! acknowledged only once every event queued before it has been delivered
//! or dead-lettered.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::LedgerEvent;
use crate::config::RelayConfig;
use crate::core::traits::EventPublisher;
use crate::types::{LedgerError, PublishError};

enum RelayMessage {
    Event(LedgerEvent),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Background publisher draining the in-process outbox
#[derive(Debug)]
pub struct EventRelay {
    sender: mpsc::UnboundedSender<RelayMessage>,
    worker: JoinHandle<()>,
    dead_letters: Arc<Mutex<Vec<LedgerEvent>>>,
}

impl std::fmt::Debug for RelayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayMessage::Event(event) => f.debug_tuple("Event").field(event).finish(),
            RelayMessage::Flush(_) => f.write_str("Flush"),
            RelayMessage::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl EventRelay {
    /// Spawn the relay task on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(publisher: Arc<dyn EventPublisher>, config: RelayConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let worker = tokio::spawn(run(
            publisher,
            config,
            receiver,
            Arc::clone(&dead_letters),
        ));

        Self {
            sender,
            worker,
            dead_letters,
        }
    }

    /// Notifier that enqueues on this relay's outbox
    pub fn notifier(&self) -> Notifier {
        Notifier::deferred(self.sender.clone())
    }

    /// Wait until every event enqueued so far has been handled
    pub async fn flush(&self) {
        let (done, acked) = oneshot::channel();
        if self.sender.send(RelayMessage::Flush(done)).is_ok() {
            let _ = acked.await;
        }
    }

    /// Events that exhausted their publish attempts
    pub fn dead_letters(&self) -> Vec<LedgerEvent> {
        self.dead_letters
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Remove and return the dead letters collected so far
    pub fn take_dead_letters(&self) -> Vec<LedgerEvent> {
        self.dead_letters
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    /// Drain the outbox, stop the relay task and return the dead letters
    ///
    /// Events enqueued after this call are rejected with `PublishFailure`.
    pub async fn shutdown(self) -> Vec<LedgerEvent> {
        let (done, acked) = oneshot::channel();
        if self.sender.send(RelayMessage::Shutdown(done)).is_ok() {
            let _ = acked.await;
        }
        drop(self.sender);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "event relay task failed");
        }
        self.dead_letters
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

async fn run(
    publisher: Arc<dyn EventPublisher>,
    config: RelayConfig,
    mut receiver: mpsc::UnboundedReceiver<RelayMessage>,
    dead_letters: Arc<Mutex<Vec<LedgerEvent>>>,
) {
    tracing::debug!("event relay started");
    let mut shutdown_ack = None;

    while let Some(message) = receiver.recv().await {
        match message {
            RelayMessage::Event(event) => {
                if let Err(e) = deliver(publisher.as_ref(), &config, &event).await {
                    tracing::error!(
                        topic = event.topic(),
                        attempts = config.max_attempts,
                        error = %e,
                        "event dead-lettered"
                    );
                    if let Ok(mut letters) = dead_letters.lock() {
                        letters.push(event);
                    }
                }
            }
            RelayMessage::Flush(done) => {
                let _ = done.send(());
            }
            RelayMessage::Shutdown(done) => {
                // Keep draining what is already queued, refuse anything new
                receiver.close();
                shutdown_ack = Some(done);
            }
        }
    }

    if let Some(done) = shutdown_ack {
        let _ = done.send(());
    }
    tracing::debug!("event relay stopped");
}

async fn deliver(
    publisher: &dyn EventPublisher,
    config: &RelayConfig,
    event: &LedgerEvent,
) -> Result<(), PublishError> {
    let topic = event.topic();
    let key = event.key();
    let payload = event.payload()?;

    let mut attempt = 1;
    loop {
        match publisher.publish(topic, &key, &payload).await {
            Ok(()) => {
                tracing::debug!(topic, attempt, "event published");
                return Ok(());
            }
            Err(e) if attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                let delay = config.backoff_after(attempt);
                tracing::warn!(topic, attempt, ?delay, error = %e, "publish failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Announces committed changes according to the configured publish mode
#[derive(Clone)]
pub struct Notifier {
    target: Target,
}

#[derive(Clone)]
enum Target {
    /// Publish immediately; failures surface to the caller
    Inline(Arc<dyn EventPublisher>),

    /// Hand off to the relay outbox
    Deferred(mpsc::UnboundedSender<RelayMessage>),
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target {
            Target::Inline(_) => f.write_str("Notifier::Inline"),
            Target::Deferred(_) => f.write_str("Notifier::Deferred"),
        }
    }
}

impl Notifier {
    /// Notifier that publishes right after commit
    pub fn inline(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            target: Target::Inline(publisher),
        }
    }

    fn deferred(outbox: mpsc::UnboundedSender<RelayMessage>) -> Self {
        Self {
            target: Target::Deferred(outbox),
        }
    }

    /// Announce an already-committed change
    ///
    /// An error here never reverts the change it describes.
    pub async fn notify(&self, event: LedgerEvent) -> Result<(), LedgerError> {
        let topic = event.topic();
        match &self.target {
            Target::Inline(publisher) => {
                let payload = event
                    .payload()
                    .map_err(|e| LedgerError::publish_failure(topic, e))?;
                publisher
                    .publish(topic, &event.key(), &payload)
                    .await
                    .map_err(|e| {
                        tracing::warn!(topic, error = %e, "inline publish failed after commit");
                        LedgerError::publish_failure(topic, e)
                    })
            }
            Target::Deferred(outbox) => outbox.send(RelayMessage::Event(event)).map_err(|_| {
                LedgerError::publish_failure(
                    topic,
                    PublishError::Unavailable {
                        message: "event relay is stopped".to_string(),
                    },
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemoryPublisher, TRANSACTION_COMPLETED_TOPIC};
    use crate::types::{Transaction, TransactionType};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn event(id: u64) -> LedgerEvent {
        LedgerEvent::transaction_completed(&Transaction {
            id,
            user_id: 1,
            from_account_id: Some(1),
            to_account_id: 2,
            amount: Decimal::new(4000, 2),
            description: String::new(),
            tx_type: TransactionType::Internal,
            created_at: Utc::now(),
        })
    }

    fn fast_retries(max_attempts: u32) -> RelayConfig {
        RelayConfig::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_relay_delivers_in_order() {
        let publisher = Arc::new(InMemoryPublisher::new());
        let relay = EventRelay::spawn(publisher.clone(), fast_retries(3));
        let notifier = relay.notifier();

        for id in 1..=3 {
            notifier.notify(event(id)).await.unwrap();
        }
        relay.flush().await;

        let keys: Vec<Vec<u8>> = publisher
            .published_on(TRANSACTION_COMPLETED_TOPIC)
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
        assert!(relay.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_relay_retries_transient_failures() {
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.fail_next(2);
        let relay = EventRelay::spawn(publisher.clone(), fast_retries(3));

        relay.notifier().notify(event(7)).await.unwrap();
        relay.flush().await;

        assert_eq!(publisher.published().len(), 1);
        assert!(relay.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_relay_dead_letters_after_max_attempts() {
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.set_online(false);
        let relay = EventRelay::spawn(publisher.clone(), fast_retries(2));

        relay.notifier().notify(event(9)).await.unwrap();
        let dead = relay.shutdown().await;

        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key(), b"9".to_vec());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_take_dead_letters_drains() {
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.set_online(false);
        let relay = EventRelay::spawn(publisher.clone(), fast_retries(1));
        let notifier = relay.notifier();

        notifier.notify(event(1)).await.unwrap();
        notifier.notify(event(2)).await.unwrap();
        relay.flush().await;

        let taken = relay.take_dead_letters();
        assert_eq!(taken.len(), 2);
        assert!(relay.dead_letters().is_empty());
        assert!(relay.take_dead_letters().is_empty());

        notifier.notify(event(3)).await.unwrap();
        let remaining = relay.shutdown().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key(), b"3".to_vec());
    }

    #[tokio::test]
    async fn test_notify_after_shutdown_fails() {
        let publisher = Arc::new(InMemoryPublisher::new());
        let relay = EventRelay::spawn(publisher, fast_retries(1));
        let notifier = relay.notifier();
        relay.shutdown().await;

        let result = notifier.notify(event(1)).await;
        assert!(matches!(result, Err(LedgerError::PublishFailure { .. })));
    }

    #[tokio::test]
    async fn test_inline_notifier_surfaces_failure() {
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.set_online(false);
        let notifier = Notifier::inline(publisher.clone());

        let result = notifier.notify(event(1)).await;
        assert_eq!(
            result.unwrap_err().kind(),
            crate::types::ErrorKind::PublishFailure
        );

        publisher.set_online(true);
        assert!(notifier.notify(event(2)).await.is_ok());
        assert_eq!(publisher.published().len(), 1);
    }
}
