//! Background workers (event-driven subscribers).

pub mod subscriber;

pub use subscriber::{SubscriberWorker, WorkerHandle};
