//! # Event bus with relays.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing, plus **relays**: explicit subscriptions that
//! re-publish every event on another bus under a derived topic.
//!
//! ## Architecture
//! ```text
//! Task bus ──relay("task.")──► Collection bus ──relay──► Runner bus ──► subscribe()
//!                                                           ▲
//! Limiter bus ───────────────relay("limited.")──────────────┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Synchronous relays**: relayed copies are published before `publish()` returns,
//!   so relay order matches publish order.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use super::event::Event;

/// Default capacity for buses owned by individual tasks and limiters.
pub(crate) const LOCAL_BUS_CAPACITY: usize = 64;

struct Relay {
    target: Bus,
    prefix: Option<&'static str>,
}

struct Inner {
    tx: broadcast::Sender<Event>,
    relays: RwLock<Vec<Relay>>,
}

/// Broadcast channel for queue events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally `Arc`-backed); clones share receivers and relays.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("receivers", &self.inner.tx.receiver_count())
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(LOCAL_BUS_CAPACITY)
    }
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                relays: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Publishes an event to all receivers, then to every relay target.
    pub fn publish(&self, ev: Event) {
        let relays = self
            .inner
            .relays
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for relay in relays.iter() {
            relay.target.publish(ev.relayed(relay.prefix));
        }
        drop(relays);
        let _ = self.inner.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.tx.subscribe()
    }

    /// Re-publishes everything published on `self` onto `target`, prefixing the topic.
    ///
    /// Relaying to the same target twice is a no-op.
    pub fn relay(&self, target: &Bus, prefix: Option<&'static str>) {
        if self.same_as(target) {
            return;
        }
        let mut relays = self
            .inner
            .relays
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if relays.iter().any(|r| r.target.same_as(target)) {
            return;
        }
        relays.push(Relay {
            target: target.clone(),
            prefix,
        });
    }

    /// Removes the relay towards `target`, if any.
    pub fn unrelay(&self, target: &Bus) {
        self.inner
            .relays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| !r.target.same_as(target));
    }

    /// Returns `true` if both handles refer to the same bus.
    pub fn same_as(&self, other: &Bus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn relay_republishes_with_prefix() {
        let task = Bus::default();
        let collection = Bus::default();
        let runner = Bus::default();
        task.relay(&collection, Some("task."));
        collection.relay(&runner, None);

        let mut rx = runner.subscribe();
        let mut local = task.subscribe();
        task.publish(Event::new(EventKind::TaskStarted).with_task("t1"));

        let ev = rx.try_recv().expect("relayed event");
        assert_eq!(ev.topic(), "task.start");
        assert_eq!(ev.task.as_deref(), Some("t1"));
        assert_eq!(local.try_recv().expect("local event").topic(), "start");
    }

    #[test]
    fn relay_is_deduplicated_and_removable() {
        let a = Bus::default();
        let b = Bus::default();
        a.relay(&b, None);
        a.relay(&b, Some("x."));
        a.relay(&a, None);

        let mut rx = b.subscribe();
        a.publish(Event::new(EventKind::RunEnded));
        assert_eq!(rx.try_recv().expect("one copy").topic(), "end");
        assert!(rx.try_recv().is_err());

        a.unrelay(&b);
        a.publish(Event::new(EventKind::RunEnded));
        assert!(rx.try_recv().is_err());
    }
}
