//! Bounded in-process event bus.
//!
//! Producers publish only after their transaction commits (the store's
//! unit of work enforces that ordering); delivery happens on a bounded
//! worker pool. A full queue blocks the producer, which is the
//! backpressure path: a saturated validation pool slows the parser.
//!
//! Handlers receive events by value and re-read their aggregates by id;
//! nothing crosses the thread boundary by reference.

#![deny(unsafe_code)]

use pkd_core::DomainEvent;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

/// Queue capacity used when callers have no stronger opinion.
pub const DEFAULT_CAPACITY: usize = 64;
/// Worker-pool width used when callers have no stronger opinion.
pub const DEFAULT_WORKERS: usize = 4;

/// Publishing failed because the dispatcher is gone.
#[derive(Debug, Error)]
#[error("event bus closed")]
pub struct BusClosed;

/// Handler side of the bus; implemented by the pipeline.
pub trait EventHandler: Send + Sync + 'static {
    /// Consume one event. Errors are the handler's to record; delivery
    /// is at-most-once and the bus does not retry.
    fn handle(&self, event: DomainEvent) -> impl Future<Output = ()> + Send;
}

/// Producer handle; cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with the given queue capacity; the returned stream
    /// is handed to [`spawn_dispatcher`].
    pub fn bounded(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, EventStream { rx })
    }

    /// Publish one event, waiting when the queue is full.
    pub async fn publish(&self, event: DomainEvent) -> Result<(), BusClosed> {
        debug!(event = event.name(), upload = %event.upload_id(), "publish");
        self.tx.send(event).await.map_err(|_| BusClosed)
    }

    /// Publish a batch in order (the after-commit hand-off).
    pub async fn publish_all(
        &self,
        events: impl IntoIterator<Item = DomainEvent>,
    ) -> Result<(), BusClosed> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Receiving end of the bus.
pub struct EventStream {
    rx: mpsc::Receiver<DomainEvent>,
}

/// Run the delivery loop: events fan out to `handler` on at most
/// `workers` concurrent tasks. The loop ends when every producer handle
/// is dropped and the queue drains.
pub fn spawn_dispatcher<H: EventHandler>(
    mut stream: EventStream,
    handler: Arc<H>,
    workers: usize,
) -> JoinHandle<()> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    tokio::spawn(async move {
        let mut inflight = Vec::new();
        while let Some(event) = stream.rx.recv().await {
            let permit = match permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break, // semaphore closed; shutting down
            };
            let handler = handler.clone();
            let span =
                info_span!("event.handle", event = event.name(), upload = %event.upload_id());
            inflight.push(tokio::spawn(
                async move {
                    handler.handle(event).await;
                    drop(permit);
                }
                .instrument(span),
            ));
            inflight.retain(|h| !h.is_finished());
        }
        for h in inflight {
            if h.await.is_err() {
                warn!("event handler task panicked");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::{ProcessingMode, UploadId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        seen: AtomicUsize,
    }

    impl EventHandler for Counting {
        async fn handle(&self, _event: DomainEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn uploaded() -> DomainEvent {
        DomainEvent::FileUploaded { upload_id: UploadId::new(), mode: ProcessingMode::Auto }
    }

    #[tokio::test]
    async fn events_reach_the_handler() {
        let (bus, stream) = EventBus::bounded(8);
        let handler = Arc::new(Counting { seen: AtomicUsize::new(0) });
        let dispatcher = spawn_dispatcher(stream, handler.clone(), 2);
        for _ in 0..5 {
            bus.publish(uploaded()).await.unwrap();
        }
        drop(bus);
        dispatcher.await.unwrap();
        assert_eq!(handler.seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let (bus, stream) = EventBus::bounded(1);
        // No dispatcher yet: the second publish must block.
        bus.publish(uploaded()).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), bus.publish(uploaded())).await;
        assert!(blocked.is_err(), "expected the bounded queue to block");

        let handler = Arc::new(Counting { seen: AtomicUsize::new(0) });
        let dispatcher = spawn_dispatcher(stream, handler.clone(), 1);
        bus.publish(uploaded()).await.unwrap();
        drop(bus);
        dispatcher.await.unwrap();
        assert!(handler.seen.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn publish_after_dispatcher_gone_is_closed() {
        let (bus, stream) = EventBus::bounded(1);
        drop(stream);
        assert!(bus.publish(uploaded()).await.is_err());
    }
}
