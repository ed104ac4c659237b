//! Engine lifecycle events and their publish/subscribe bus.
//! Each subscriber owns an unbounded queue, so a slow reader never blocks the
//! engine and every current subscriber receives every matching event.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::capture::Utterance;
use crate::intent::ReminderIntent;

/// Lifecycle event. Serializes as `{ "type": "capture-stop", "result": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "result", rename_all = "kebab-case")]
pub enum EngineEvent {
    WakeListenStart,
    WakeListenStop,
    WakeHeard,
    CaptureStart,
    /// `None` when the capture failed or was aborted.
    CaptureStop(Option<Utterance>),
    ReminderParsed(ReminderIntent),
}

/// Payload-free tag of an [`EngineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    WakeListenStart,
    WakeListenStop,
    WakeHeard,
    CaptureStart,
    CaptureStop,
    ReminderParsed,
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::WakeListenStart => EventKind::WakeListenStart,
            EngineEvent::WakeListenStop => EventKind::WakeListenStop,
            EngineEvent::WakeHeard => EventKind::WakeHeard,
            EngineEvent::CaptureStart => EventKind::CaptureStart,
            EngineEvent::CaptureStop(_) => EventKind::CaptureStop,
            EngineEvent::ReminderParsed(_) => EventKind::ReminderParsed,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::WakeListenStart => "wake-listen-start",
            EventKind::WakeListenStop => "wake-listen-stop",
            EventKind::WakeHeard => "wake-heard",
            EventKind::CaptureStart => "capture-start",
            EventKind::CaptureStop => "capture-stop",
            EventKind::ReminderParsed => "reminder-parsed",
        };
        f.write_str(name)
    }
}

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    filter: Option<EventKind>,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Receiving end of a subscription. Dropping it unsubscribes lazily.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Receive every event.
    pub fn subscribe(&self) -> Subscription {
        self.add(None)
    }

    /// Receive only events of `kind`.
    pub fn subscribe_kind(&self, kind: EventKind) -> Subscription {
        self.add(Some(kind))
    }

    fn add(&self, filter: Option<EventKind>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { id, filter, tx });
        Subscription { id, rx }
    }

    /// Remove a subscriber; its queue closes after the pending events.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Deliver to all matching subscribers, pruning ones whose receiver is gone.
    pub fn emit(&self, event: EngineEvent) {
        let kind = event.kind();
        debug!(event = %kind, "engine_event");
        self.subscribers.lock().retain(|s| {
            if s.filter.is_some_and(|f| f != kind) {
                return !s.tx.is_closed();
            }
            s.tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(EngineEvent::WakeHeard).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "wake-heard" }));

        let json = serde_json::to_value(EngineEvent::CaptureStop(Some(Utterance {
            utterance: "hi".into(),
            confidence: 0.5,
        })))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "capture-stop",
                "result": { "utterance": "hi", "confidence": 0.5 }
            })
        );
    }

    #[test]
    fn test_all_subscribers_receive() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(EngineEvent::CaptureStart);
        assert_eq!(a.try_recv(), Some(EngineEvent::CaptureStart));
        assert_eq!(b.try_recv(), Some(EngineEvent::CaptureStart));
    }

    #[test]
    fn test_kind_filter() {
        let bus = EventBus::new();
        let mut heard = bus.subscribe_kind(EventKind::WakeHeard);
        bus.emit(EngineEvent::CaptureStart);
        bus.emit(EngineEvent::WakeHeard);
        assert_eq!(heard.try_recv(), Some(EngineEvent::WakeHeard));
        assert_eq!(heard.try_recv(), None);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));
        bus.emit(EngineEvent::WakeHeard);
        assert_eq!(sub.try_recv(), None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        let bus = std::sync::Arc::new(EventBus::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = std::sync::Arc::clone(&bus);
                std::thread::spawn(move || (0..50).map(|_| bus.subscribe().id()).collect::<Vec<_>>())
            })
            .collect();
        let ids: Vec<SubscriptionId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        drop(sub);
        bus.emit(EngineEvent::WakeHeard);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
