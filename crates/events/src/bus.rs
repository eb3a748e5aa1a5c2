//! Topic-based publish/subscribe abstraction (mechanics only).
//!
//! The bus distributes [`Routed`] messages to every subscriber registered for the
//! message's topic. It is the seam between event producers and the distribution
//! pipeline.
//!
//! ## Delivery Guarantees
//!
//! - **At-most-once**: a message that is lost between publish and handling (e.g. the
//!   process stops) is gone; there is no persistence and no replay.
//! - **Per-topic ordering**: messages of the same topic reach a given subscriber in
//!   publish order. There is no ordering guarantee across topics.
//! - **Isolation**: each subscriber owns its own queue, so a slow or failing subscriber
//!   never blocks the publisher or its siblings.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use crate::event::Routed;

/// A subscription to a single topic.
///
/// Each subscription gets its own copy of every message published on the topic
/// after it was created (broadcast semantics).
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut sub = bus.subscribe(EventType::StockLow);
/// while let Some(event) = sub.recv().await {
///     handle(event).await;
/// }
/// // `None`: the bus was dropped.
/// ```
///
/// Dropping the subscription unsubscribes it; the bus prunes it on the next publish.
#[derive(Debug)]
pub struct Subscription<M: Routed> {
    topic: M::Topic,
    receiver: UnboundedReceiver<M>,
}

impl<M: Routed> Subscription<M> {
    pub fn new(topic: M::Topic, receiver: UnboundedReceiver<M>) -> Self {
        Self { topic, receiver }
    }

    pub fn topic(&self) -> &M::Topic {
        &self.topic
    }

    /// Wait for the next message. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic, topic-routed event bus.
///
/// ```text
/// Producer ─publish─▶ EventBus ─┬─▶ Subscription(topic A) ─▶ orchestrator worker
///                               └─▶ Subscription(topic A) ─▶ audit worker
/// ```
///
/// Subscriptions are wired statically at startup; there is no dynamic unsubscribe
/// other than dropping the subscription.
///
/// `publish()` never waits for handlers. It fails only when the bus itself is broken
/// (e.g. a poisoned lock); a subscriber that has gone away is not an error.
pub trait EventBus<M: Routed>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self, topic: M::Topic) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    M: Routed,
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self, topic: M::Topic) -> Subscription<M> {
        (**self).subscribe(topic)
    }
}
