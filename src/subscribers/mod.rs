//! # Event subscribers for the task queue.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and a
//! built-in [`LogWriter`] for handling events broadcast through a runner's
//! [`Bus`](crate::Bus).
//!
//! ## Architecture
//! ```text
//! Task ── publish(Event) ──► Collection bus ──► Runner bus ──► listener ──► SubscriberSet
//!                                                                              │
//!                                                                    ┌─────────┼─────────┐
//!                                                                    ▼         ▼         ▼
//!                                                               LogWriter   Metrics    Custom
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
