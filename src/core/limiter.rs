//! # Batch rate limiter.
//!
//! Splits tasks into consecutive batches of at most `max` and runs one batch per
//! window: a batch never ends before `duration` has elapsed since it started.
//!
//! ```text
//! batch 1: batch.start ─► run tasks ─► wait until start + duration ─► batch.end
//! batch 2: batch.start ─► ...
//! ...
//! done
//! ```
//!
//! Within a batch, tasks run sequentially, through a [`ConcurrencyThrottle`]
//! (when `max_concurrent` is set), or all in parallel.
//!
//! Once the cancellation token fires, the limiter skips the remaining wait and
//! starts no further batches.

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::RateLimit;
use super::dispatch::{SettleHook, run_parallel, run_sequential};
use super::throttle::ConcurrencyThrottle;
use crate::events::{BatchInfo, Bus, Event, EventKind};
use crate::tasks::{Outcome, TaskRef};

/// Runs tasks in rate-limited batches.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use taskqueue::{BatchRateLimiter, Handler, RateLimit, Task};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tasks = (0..6)
///     .map(|i| Task::arc(format!("t{i}"), Handler::sync(|_| {})))
///     .collect();
/// let limit = RateLimit::new(2, Duration::from_millis(10)).unwrap();
/// let limiter = BatchRateLimiter::new(limit, tasks);
/// assert_eq!(limiter.batches(), 3);
/// limiter.run(false).await;
/// # }
/// ```
pub struct BatchRateLimiter {
    limit: RateLimit,
    tasks: Vec<TaskRef>,
    max_concurrent: Option<usize>,
    cancel: Option<CancellationToken>,
    bus: Bus,
}

impl BatchRateLimiter {
    pub fn new(limit: RateLimit, tasks: Vec<TaskRef>) -> Self {
        Self {
            limit,
            tasks,
            max_concurrent: None,
            cancel: None,
            bus: Bus::default(),
        }
    }

    /// Throttles parallel batches to at most `max` running tasks (`0` = unlimited).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = (max > 0).then_some(max);
        self
    }

    /// Stops between batches once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Number of batches the task list splits into.
    pub fn batches(&self) -> usize {
        self.limit.batches(self.tasks.len())
    }

    /// Receives `batch.start`, `batch.end` and `done`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs every batch in order.
    pub async fn run(&self, sequential: bool) {
        self.run_with(sequential, &mut |_: &TaskRef, _: Outcome| {})
            .await;
    }

    /// Like [`run`](Self::run), reporting starts and settlements to `hook`.
    pub async fn run_with(&self, sequential: bool, hook: &mut dyn SettleHook) {
        for (index, batch) in self.tasks.chunks(self.limit.max()).enumerate() {
            if self.is_cancelled() {
                debug!(batch = index + 1, "run aborted; remaining batches not started");
                break;
            }

            let start = Instant::now();
            let mut info = BatchInfo {
                id: index + 1,
                start,
                end: None,
                duration: None,
                processing_time: None,
                tasks: batch.len(),
            };
            self.bus
                .publish(Event::new(EventKind::BatchStarted).with_batch(info));

            if sequential {
                run_sequential(batch, hook).await;
            } else if let Some(max) = self.max_concurrent {
                ConcurrencyThrottle::new(max, batch.to_vec())
                    .run_with(hook)
                    .await;
            } else {
                run_parallel(batch, hook).await;
            }
            let processed = Instant::now();

            self.wait_until(start + self.limit.duration()).await;
            let end = Instant::now();

            info.end = Some(end);
            info.duration = Some(end - start);
            info.processing_time = Some(processed - start);
            debug!(
                batch = info.id,
                tasks = info.tasks,
                processing = ?info.processing_time,
                "batch finished"
            );
            self.bus
                .publish(Event::new(EventKind::BatchEnded).with_batch(info));
        }

        self.bus.publish(Event::new(EventKind::Drained));
    }

    async fn wait_until(&self, deadline: Instant) {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = token.cancelled() => {}
                }
            }
            None => tokio::time::sleep_until(deadline).await,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
