//! # taskqueue
//!
//! **Taskqueue** runs an ordered list of tasks to completion under one of several
//! execution policies: unbounded parallel, strictly sequential, concurrency-bounded
//! ("throttled") or rate-limited in batches. It tracks per-task and aggregate state
//! and supports timeouts, cancellation and skipping.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  TaskConfig  │   │  TaskConfig  │   │  TaskConfig  │
//!     │  (Handler)   │   │  (Handler)   │   │  (Handler)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runner (orchestrator)                                            │
//! │  - TaskCollection (ordered tasks, names, numbers)                 │
//! │  - CancellationToken (the "may start" flag tasks consult)         │
//! │  - global timer, progress counters, status machine                │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  BatchRateLimiter   ConcurrencyThrottle   run_parallel / run_sequential
//!  (batch + window)   (sliding window)      (plain dispatch)
//!        │                  │                  │
//!        └──────────────────┴─────► Task::run() ──► Handler(ctx[, done])
//!
//! Events:
//!   Task bus ──"task."──► Runner bus ◄──"limited."── limiter bus
//!                             │
//!                             ├──► Runner::subscribe() receivers
//!                             └──► SubscriberSet (per-subscriber queues/workers)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! pending ──run()──► running ──┬─ finish ───────► complete
//!    │                         ├─ ctx.fail() ───► failed
//!    │                         └─ timer fires ──► timedout ──► runner aborts (timeout)
//!    └─ skip requested ─────────────────────────► skipped
//!
//! reset(): any state ──► pending
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                              |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------------|
//! | **Runner**        | Add/remove tasks, run, abort, reset, plan and progress.      | [`Runner`], [`RunOutcome`], [`Plan`]            |
//! | **Tasks**         | Units of work with explicit sync/async handlers.             | [`Task`], [`Handler`], [`Done`], [`TaskContext`]|
//! | **Policies**      | Throttle and rate-limit usable with or without a runner.     | [`ConcurrencyThrottle`], [`BatchRateLimiter`]   |
//! | **Events**        | Typed events with dotted topics over a broadcast bus.        | [`Event`], [`EventKind`], [`Bus`]               |
//! | **Subscriber API**| Hook into events (logging, metrics, custom subscribers).     | [`Subscribe`], [`SubscriberSet`]                |
//! | **Errors**        | Typed configuration, argument and lookup errors.             | [`QueueError`]                                  |
//! | **Configuration** | Global timeout, rate limit, concurrency cap.                 | [`RunnerConfig`], [`RateLimit`]                 |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskqueue::{Handler, RunOutcome, Runner, RunnerConfig, TaskConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = RunnerConfig::default();
//!     cfg.timeout = Duration::from_secs(5);
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn taskqueue::Subscribe>> = vec![Arc::new(taskqueue::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn taskqueue::Subscribe>> = Vec::new();
//!
//!     let runner = Runner::builder(cfg).with_subscribers(subs).build();
//!
//!     runner.add(TaskConfig::named("hello").handler(Handler::sync(|ctx| {
//!         println!("Hello from {}!", ctx.name());
//!     })))?;
//!     runner.add(Handler::with_done(|_ctx, done| async move {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         done.finish();
//!     }))?;
//!
//!     assert_eq!(runner.run_sync().await, RunOutcome::Completed);
//!     runner.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use crate::core::{
    BatchRateLimiter, ConcurrencyThrottle, Plan, Progress, RateLimit, RunOutcome, Runner,
    RunnerBuilder, RunnerConfig, RunnerStatus, SettleHook, TaskSelector, TaskSummary,
    run_parallel, run_sequential,
};
pub use error::QueueError;
pub use events::{BatchInfo, Bus, Event, EventKind, StatusChange};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{
    BoxHandlerFuture, Completion, Done, Handler, Outcome, Task, TaskCollection, TaskConfig,
    TaskContext, TaskEntry, TaskRef, TaskStatus, TaskTarget,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
