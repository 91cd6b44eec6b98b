//! Process-local publish/subscribe event bus (spec §4.1).
//!
//! Publishing invokes every currently registered synchronous subscriber and
//! blocks only for the duration of each handler. `channel` hands a consumer
//! a bounded `mpsc` receiver; if the consumer's buffer is full the event for
//! that consumer is dropped silently — live streaming must never stall the
//! runner, since the durable run record is the authoritative record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::event::Event;

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// A registered channel consumer (e.g. an SSE stream).
struct Consumer {
    sender: mpsc::Sender<Event>,
}

#[derive(Default)]
struct Inner {
    handlers: RwLock<Vec<Handler>>,
    consumers: RwLock<Vec<Consumer>>,
    dropped: AtomicU64,
}

/// Fan-out event bus. Cheap to clone (shares one `Inner` behind an `Arc`).
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous callback. No ordering guarantee between
    /// subscribers.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .expect("event bus handlers lock poisoned")
            .push(Box::new(handler));
    }

    /// Invoke every currently registered subscriber, then forward to every
    /// live channel consumer (non-blocking, drop-on-full).
    pub fn publish(&self, event: Event) {
        // Copy-on-read under the read lock so handlers may subscribe more
        // handlers without deadlocking.
        let handlers = self
            .inner
            .handlers
            .read()
            .expect("event bus handlers lock poisoned");
        for handler in handlers.iter() {
            handler(&event);
        }
        drop(handlers);

        let consumers = self
            .inner
            .consumers
            .read()
            .expect("event bus consumers lock poisoned");
        for consumer in consumers.iter() {
            if consumer.sender.try_send(event.clone()).is_err() {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns a bounded consumer stream. Closing (dropping) the receiver
    /// detaches the consumer; there is no explicit `unsubscribe` call.
    pub fn channel(&self, buffer: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.inner
            .consumers
            .write()
            .expect("event bus consumers lock poisoned")
            .push(Consumer { sender: tx });
        rx
    }

    /// Count of events dropped so far due to a full consumer buffer
    /// (observability only, not part of the spec contract).
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_invokes_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(Event::done(Uuid::now_v7(), "completed"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn channel_receives_only_events_after_subscription() {
        let bus = EventBus::new();
        let run_id = Uuid::now_v7();
        bus.publish(Event::done(run_id, "completed")); // no consumer yet

        let mut rx = bus.channel(8);
        bus.publish(Event::node_started(run_id, "a"));

        let received = rx.recv().await.expect("expected an event");
        assert_eq!(received.event_type, crate::event::NODE_STARTED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_consumer_buffer_drops_silently() {
        let bus = EventBus::new();
        let _rx = bus.channel(1);
        let run_id = Uuid::now_v7();
        bus.publish(Event::node_started(run_id, "a"));
        bus.publish(Event::node_started(run_id, "b")); // buffer full, dropped

        assert_eq!(bus.dropped_count(), 1);
    }
}
