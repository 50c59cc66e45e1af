//! In-memory event publisher for tests, replays and simulations
//!
//! Records every delivered message, fans it out to subscribers, and can be
//! switched offline or told to fail a number of upcoming calls to simulate
//! an event bus outage.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::core::traits::EventPublisher;
use crate::types::PublishError;

/// A message accepted by the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// In-memory pub/sub channel
///
/// - Single attempt per call, no retry
/// - Best-effort fan-out; dropped subscribers are pruned on publish
#[derive(Debug)]
pub struct InMemoryPublisher {
    online: AtomicBool,
    failures_remaining: AtomicUsize,
    published: Mutex<Vec<PublishedMessage>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PublishedMessage>>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the channel offline (every publish fails) or back online
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make the next `count` publish calls fail
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every message delivered so far, in delivery order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Messages delivered on a single topic
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.topic == topic)
            .collect()
    }

    /// Receive a copy of every message delivered after this call
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PublishedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        // A poisoned lock still yields a receiver; it just stays silent.
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            failures_remaining: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), PublishError> {
        if !self.online.load(Ordering::SeqCst) || self.take_failure() {
            return Err(PublishError::Unavailable {
                message: format!("in-memory bus rejected message on {}", topic),
            });
        }

        let message = PublishedMessage {
            topic: topic.to_string(),
            key: key.to_vec(),
            payload: payload.to_vec(),
        };

        self.published
            .lock()
            .map_err(|_| PublishError::Unavailable {
                message: "publisher lock poisoned".to_string(),
            })?
            .push(message.clone());

        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        }

        Ok(())
    }
}
