//! In-memory event bus for the single-process deployment and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use crate::bus::{EventBus, Subscription};
use crate::event::Routed;

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO, no persistence
/// - Per-topic fan-out over unbounded channels
/// - At-most-once: nothing is kept for subscribers that do not exist yet
#[derive(Debug)]
pub struct InMemoryEventBus<M: Routed> {
    subscribers: Mutex<HashMap<M::Topic, Vec<UnboundedSender<M>>>>,
}

impl<M: Routed> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions for a topic (dropped ones are counted until
    /// the next publish prunes them).
    pub fn subscriber_count(&self, topic: &M::Topic) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl<M: Routed> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl<M: Routed> EventBus<M> for InMemoryEventBus<M> {
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let topic = message.topic();
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        let Some(senders) = subs.get_mut(&topic) else {
            debug!(topic = ?topic, "published with no subscribers");
            return Ok(());
        };

        // Drop any dead subscribers while publishing.
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        debug!(topic = ?topic, delivered = senders.len(), "published");

        Ok(())
    }

    fn subscribe(&self, topic: M::Topic) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.entry(topic.clone()).or_default().push(tx);
        }

        Subscription::new(topic, rx)
    }
}
