//! Synchronous publish/subscribe for controller events.
//!
//! Listeners are invoked in subscription order, on the publishing thread,
//! before the publishing controller call returns. The listener list is copied
//! out before dispatch, so a listener may subscribe, unsubscribe or call back
//! into the controller.
//!
//! A broadcast tap is available for async consumers that prefer to poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use super::{ControllerEvent, EventKind};

/// Capacity of the broadcast tap; slow receivers lose the oldest events.
const TAP_CAPACITY: usize = 256;

pub type Listener = Arc<dyn Fn(&ControllerEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    filter: Option<EventKind>,
    listener: Listener,
}

pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            tap,
        }
    }

    /// Registers `listener` for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ControllerEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Registers `listener` for every event kind.
    pub fn subscribe_all<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ControllerEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Receiver that sees every event published after this call.
    pub fn tap(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tap.subscribe()
    }

    /// Delivers `event` to all matching listeners.
    pub fn publish(&self, event: &ControllerEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.filter.map_or(true, |k| k == kind))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        trace!(kind = %kind, request = %event.request().id, listeners = targets.len(), "publish");
        for listener in targets {
            listener(event);
        }

        // No receivers is fine.
        let _ = self.tap.send(event.clone());
    }

    pub(crate) fn publish_all(&self, events: Vec<ControllerEvent>) {
        for event in &events {
            self.publish(event);
        }
    }

    fn insert(&self, filter: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            filter,
            listener,
        });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestId, RequestSnapshot};
    use std::sync::atomic::AtomicUsize;

    fn snapshot(id: u64) -> RequestSnapshot {
        RequestSnapshot {
            id: RequestId::new(id),
            name: "GET /persons".into(),
            url: "/persons".into(),
            method: "GET".into(),
            latency_ms: 100,
            expires_at: Some(100),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn delivers_only_matching_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(EventKind::RequestCompleted, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&ControllerEvent::NewRequest(snapshot(1)));
        bus.publish(&ControllerEvent::RequestCompleted(snapshot(1)));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_all_sees_every_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.subscribe_all(move |e| s.lock().push(e.kind()));

        bus.publish(&ControllerEvent::NewRequest(snapshot(1)));
        bus.publish(&ControllerEvent::RequestPaused(snapshot(1)));
        bus.publish(&ControllerEvent::RequestResumed(snapshot(1)));
        bus.publish(&ControllerEvent::RequestCompleted(snapshot(1)));

        assert_eq!(*seen.lock(), EventKind::ALL.to_vec());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&ControllerEvent::NewRequest(snapshot(1)));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&ControllerEvent::NewRequest(snapshot(2)));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let own_id = Arc::new(Mutex::new(None));
        let (b, slot) = (Arc::clone(&bus), Arc::clone(&own_id));
        let id = bus.subscribe_all(move |_| {
            if let Some(id) = *slot.lock() {
                b.unsubscribe(id);
            }
        });
        *own_id.lock() = Some(id);

        bus.publish(&ControllerEvent::NewRequest(snapshot(1)));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn tap_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.tap();
        bus.publish(&ControllerEvent::RequestPaused(snapshot(3)));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::RequestPaused);
        assert_eq!(event.request().id, RequestId::new(3));
    }

    #[test]
    fn kind_names_match_wire_names() {
        let names: Vec<_> = EventKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            ["new-request", "request-paused", "request-resumed", "request-completed"]
        );
    }
}
