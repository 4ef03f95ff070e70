//! Topic-based publish/subscribe
//!
//! Handlers run synchronously on the publisher's thread, in subscription
//! order. For the engine that thread is the worker, so handlers must not
//! block; consumers that need to do real work should use
//! [`EventBus::subscribe_channel`] and process notifications elsewhere.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::{Notification, Topic};

/// Error type handlers may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Notification) -> Result<(), HandlerError> + Send + Sync>;

/// Identifies one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// In-process event bus
///
/// Cloning is cheap; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("subscriptions", &registry.subscriptions.len())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscriptions.push(Subscription {
            id,
            topic,
            handler: Arc::new(handler),
        });
        debug!("Subscribed {:?} to {:?}", id, topic);
        id
    }

    /// Register a bounded queue for `topic`
    ///
    /// Notifications that arrive while the queue is full are dropped, so a
    /// slow consumer never stalls the publisher.
    pub fn subscribe_channel(
        &self,
        topic: Topic,
        capacity: usize,
    ) -> (SubscriptionId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.subscribe(topic, move |notification| {
            match tx.try_send(notification.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    debug!("Subscriber queue for {:?} full, dropping notification", topic);
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err("subscriber queue closed".into()),
            }
        });
        (id, rx)
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.subscriptions.len();
        registry.subscriptions.retain(|s| s.id != id);
        before != registry.subscriptions.len()
    }

    /// Number of handlers registered for `topic`
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Deliver `notification` to every handler of its topic
    ///
    /// Returns how many handlers completed successfully. A handler that fails
    /// or panics is logged and skipped; the remaining handlers still run.
    pub fn publish(&self, notification: &Notification) -> usize {
        let topic = notification.topic();
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .subscriptions
                .iter()
                .filter(|s| s.topic == topic)
                .map(|s| (s.id, s.handler.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Handler {:?} for {:?} failed: {}", id, topic, e),
                Err(_) => warn!("Handler {:?} for {:?} panicked", id, topic),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;

    fn port(name: &str) -> Notification {
        Notification::PortFound {
            port: name.to_string(),
        }
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(Topic::PortFound, move |_| {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }

        assert_eq!(bus.publish(&port("COM3")), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_only_matching_topic_is_called() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        bus.subscribe(Topic::StateChanged, move |_| {
            *c.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(bus.publish(&port("COM3")), 0);
        bus.publish(&Notification::StateChanged {
            from: SessionState::Stopped,
            to: SessionState::Initializing,
        });
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe(Topic::PortFound, |_| Err("boom".into()));
        bus.subscribe(Topic::PortFound, |_| panic!("handler bug"));
        let r = reached.clone();
        bus.subscribe(Topic::PortFound, move |_| {
            *r.lock().unwrap() = true;
            Ok(())
        });

        assert_eq!(bus.publish(&port("COM3")), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(Topic::PortFound, |_| Ok(()));
        assert_eq!(bus.subscriber_count(Topic::PortFound), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&port("COM3")), 0);
    }

    #[test]
    fn test_handler_may_subscribe_while_publishing() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.subscribe(Topic::PortFound, move |_| {
            inner.subscribe(Topic::PortFound, |_| Ok(()));
            Ok(())
        });

        assert_eq!(bus.publish(&port("COM3")), 1);
        assert_eq!(bus.subscriber_count(Topic::PortFound), 2);
    }

    #[test]
    fn test_channel_subscriber_drops_when_full() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe_channel(Topic::PortFound, 2);

        for name in ["a", "b", "c"] {
            bus.publish(&port(name));
        }

        let mut ports = Vec::new();
        while let Ok(Notification::PortFound { port }) = rx.try_recv() {
            ports.push(port);
        }
        assert_eq!(ports, vec!["a", "b"]);
    }

    #[test]
    fn test_closed_channel_subscriber_reports_failure() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe_channel(Topic::PortFound, 1);
        drop(rx);

        assert_eq!(bus.publish(&port("COM3")), 0);
    }
}
