//! Broadcast event bus used for SSE fan-out
//!
//! Generic over the event type `E` rather than tied to one event enum,
//! since callers only ever need a single stream (the Job Scheduler's
//! `JobEvent`) but shouldn't have to name it from this crate.

use tokio::sync::broadcast;

/// A broadcast channel with a bounded backlog; subscribers that fall behind
/// miss the oldest events rather than stalling the publisher.
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// `capacity` bounds how many events a slow subscriber may lag behind
    /// before older events are dropped for it.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers that received it.
    /// Returns `Err` if there were no subscribers at all.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening.
    pub fn emit_lossy(&self, event: E) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(7).unwrap();
        assert_eq!(rx.recv().await.unwrap(), 7);
    }

    #[test]
    fn emit_without_subscribers_reports_error() {
        let bus: EventBus<u32> = EventBus::new(16);
        assert!(bus.emit(1).is_err());
    }

    #[test]
    fn emit_lossy_never_panics_without_subscribers() {
        let bus: EventBus<u32> = EventBus::new(16);
        bus.emit_lossy(1);
    }
}
