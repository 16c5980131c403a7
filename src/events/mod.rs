//! Queue events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by tasks, collections, limiters and the runner.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast` with relays
//!
//! ## Quick reference
//! - **Publishers**: `Task`, `TaskCollection`, `ConcurrencyThrottle`,
//!   `BatchRateLimiter`, `Runner`.
//! - **Consumers**: `Runner::subscribe()` receivers and the optional
//!   `SubscriberSet` listener wired by `RunnerBuilder`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{BatchInfo, Event, EventKind, StatusChange};
