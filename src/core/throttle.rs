//! # Concurrency throttle.
//!
//! Runs a list of tasks with at most `max` of them active at once. The first `max`
//! tasks start together; every settlement starts the next queued task.
//!
//! ```text
//! queue: [t1 t2 t3 t4 t5]   max = 2
//!
//! start t1 t2 ─► t2 settles ─► start t3 ─► t1 settles ─► start t4 ─► ... ─► `done`
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tracing::debug;

use super::dispatch::{SettleHook, launch};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Outcome, TaskRef};

/// Limits how many tasks of a list run at the same time.
///
/// ## Example
/// ```rust
/// use taskqueue::{ConcurrencyThrottle, Handler, Task};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tasks = (0..5)
///     .map(|i| Task::arc(format!("t{i}"), Handler::sync(|_| {})))
///     .collect();
/// let throttle = ConcurrencyThrottle::new(2, tasks);
/// throttle.run().await;
/// assert_eq!(throttle.active_count(), 0);
/// # }
/// ```
pub struct ConcurrencyThrottle {
    max: usize,
    tasks: Vec<TaskRef>,
    active: Arc<AtomicUsize>,
    bus: Bus,
}

impl ConcurrencyThrottle {
    /// Creates a throttle. A `max` of zero is treated as one.
    pub fn new(max: usize, tasks: Vec<TaskRef>) -> Self {
        Self {
            max: max.max(1),
            tasks,
            active: Arc::new(AtomicUsize::new(0)),
            bus: Bus::default(),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of tasks currently started but not yet settled.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Receives `done` when the throttle drains.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Runs every task and resolves once all of them settled.
    pub async fn run(&self) {
        self.run_with(&mut |_: &TaskRef, _: Outcome| {}).await;
    }

    /// Like [`run`](Self::run), reporting starts and settlements to `hook`.
    pub async fn run_with(&self, hook: &mut dyn SettleHook) {
        let mut queue: VecDeque<TaskRef> = self.tasks.iter().cloned().collect();
        let mut running: FuturesUnordered<Launch> = FuturesUnordered::new();

        while running.len() < self.max {
            let Some(task) = queue.pop_front() else { break };
            self.start(task, hook, &mut running);
        }

        while let Some((task, outcome)) = running.next().await {
            self.active.fetch_sub(1, Ordering::SeqCst);
            hook.settled(&task, outcome);
            if let Some(next) = queue.pop_front() {
                self.start(next, hook, &mut running);
            }
        }

        debug!(tasks = self.tasks.len(), max = self.max, "throttle drained");
        self.bus.publish(Event::new(EventKind::Drained));
    }

    fn start(&self, task: TaskRef, hook: &mut dyn SettleHook, running: &mut FuturesUnordered<Launch>) {
        hook.starting(&task);
        self.active.fetch_add(1, Ordering::SeqCst);
        running.push(Box::pin(launch(task)));
    }
}

type Launch = Pin<Box<dyn Future<Output = (TaskRef, Outcome)> + Send>>;
