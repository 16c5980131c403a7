//! # Queue event consumers.
//!
//! A [`Subscribe`] implementation receives every event a [`Runner`](crate::Runner)
//! publishes: runner status changes, relayed `task.*` events and, under a rate limit,
//! the `limited.batch.*` windows.
//!
//! ```text
//! Runner bus ──► SubscriberSet ──► [queue per subscriber] ──► on_event()
//! ```
//!
//! A subscriber that falls behind overflows only its own queue; the pass it observes
//! keeps going.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use async_trait::async_trait;
//! use taskqueue::{Event, Subscribe};
//!
//! /// Counts rate-limit windows and tasks that failed inside them.
//! #[derive(Default)]
//! struct BatchAudit {
//!     windows: AtomicUsize,
//!     failures: AtomicUsize,
//! }
//!
//! #[async_trait]
//! impl Subscribe for BatchAudit {
//!     async fn on_event(&self, ev: &Event) {
//!         match ev.topic().as_str() {
//!             "limited.batch.end" => {
//!                 self.windows.fetch_add(1, Ordering::Relaxed);
//!             }
//!             "task.failed" => {
//!                 self.failures.fetch_add(1, Ordering::Relaxed);
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "batch-audit" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of runner events.
///
/// `on_event` runs on the subscriber's own worker, one event at a time, in publish
/// order. Panics are caught and logged by the owning set.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Label used when logging overflow or a panic for this subscriber.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this subscriber before new ones are dropped (min 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
