//! `taskforge-events`: business events and their in-process distribution.
//!
//! Producers (invoicing, purchasing, warranty, inventory) publish [`DomainEvent`]s;
//! consumers subscribe per [`EventType`] topic. Delivery is at-most-once and
//! in-process only.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{DomainEvent, EventType, Routed};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
