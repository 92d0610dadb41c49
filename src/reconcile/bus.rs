//! Ordered fan-out of change events to subscribers
//!
//! Each subscriber owns an unbounded queue. Publishing only enqueues, so
//! it never blocks the OS callback thread that caused the transition;
//! the subscriber drains its queue on its own task.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::ChangeEvent;

type SubscriberList = Vec<(u64, mpsc::UnboundedSender<ChangeEvent>)>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: SubscriberList,
}

/// Change event bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push((id, tx));
        debug!(subscriber = id, "subscriber registered");

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Enqueue an event for every subscriber, in registration order.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut inner = self.inner.lock();
        // Subscribers whose receiver is gone are pruned on the way
        inner.subscribers.retain(|(_, tx)| tx.send(event).is_ok());
        inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

fn remove(inner: &Mutex<BusInner>, id: u64) -> bool {
    let mut inner = inner.lock();
    let before = inner.subscribers.len();
    inner.subscribers.retain(|(sub, _)| *sub != id);
    let removed = inner.subscribers.len() != before;
    if removed {
        debug!(subscriber = id, "subscriber removed");
    }
    removed
}

/// Receiving end of a bus subscription
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Next queued event, if any, without waiting
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued so far
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            remove(&bus, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(current: bool) -> ChangeEvent {
        ChangeEvent {
            previous: !current,
            current,
        }
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(event(true)), 2);
        assert_eq!(bus.publish(event(false)), 2);

        assert_eq!(first.drain(), vec![event(true), event(false)]);
        assert_eq!(second.drain(), vec![event(true), event(false)]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(event(true)), 0);
    }

    #[test]
    fn test_recv_async() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(event(true));
        let received = tokio_test::block_on(sub.recv());
        assert_eq!(received, Some(event(true)));
    }
}
