use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use taskforge_events::{EventBus, Routed, Subscription};

/// Handle to control and join a background subscriber.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request graceful shutdown and wait for the worker to stop. The message in
    /// flight (if any) is finished first; queued ones are dropped.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Generic subscriber loop.
///
/// - Subscribes to one topic of an event bus
/// - Handles messages one at a time, in publish order
/// - A handler error or panic is logged and the loop moves on
/// - Stops on shutdown or when the bus goes away
#[derive(Debug)]
pub struct SubscriberWorker;

impl SubscriberWorker {
    /// Subscribe now and spawn the loop on the current tokio runtime.
    ///
    /// The subscription is registered before this returns, so anything published
    /// afterwards reaches the worker.
    pub fn spawn<M, B, H, Fut, E>(name: &'static str, bus: &B, topic: M::Topic, handler: H) -> WorkerHandle
    where
        M: Routed,
        B: EventBus<M> + ?Sized,
        H: Fn(M) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let sub: Subscription<M> = bus.subscribe(topic);

        let join = tokio::spawn(worker_loop(name, sub, shutdown_rx, handler));

        WorkerHandle {
            name,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

async fn worker_loop<M, H, Fut, E>(
    name: &'static str,
    mut sub: Subscription<M>,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: H,
) where
    M: Routed,
    H: Fn(M) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Debug,
{
    debug!(worker = name, topic = ?sub.topic(), "subscriber started");

    loop {
        let message = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            message = sub.recv() => message,
        };

        let Some(message) = message else {
            // Bus dropped.
            break;
        };

        let handled = handler(message);
        match AssertUnwindSafe(handled).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(worker = name, error = ?err, "subscriber handler failed"),
            Err(_) => error!(worker = name, "subscriber handler panicked"),
        }
    }

    debug!(worker = name, "subscriber stopped");
}
