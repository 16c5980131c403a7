//! # Runner: owns a task collection and drives one pass over it at a time.
//!
//! The [`Runner`] selects an execution policy per [`run`](Runner::run), tracks progress,
//! and owns the cancellation token every task consults before starting.
//!
//! ## Policy selection
//! ```text
//! rate_limit set                  ─► BatchRateLimiter  (throttled per batch if max_concurrent && !sequential)
//! max_concurrent set && !sequential ─► ConcurrencyThrottle
//! !sequential                     ─► run_parallel
//! sequential                      ─► run_sequential
//! ```
//!
//! ## Status machine
//! ```text
//! pending ──run()──► running ──all done──► `end` ──► reset() ──► pending
//!                       │
//!                       ├─abort()───────► aborting ──wound down──► aborted
//!                       └─timeout───────► timeout
//! ```
//! Every transition publishes `status.change { old, current }`.
//!
//! ## Rules
//! - Abort is advisory: started tasks run to their natural end; unstarted tasks never start.
//! - `abort()` is idempotent within a pass; only the first call publishes `abort`/`timeout`.
//! - `run()` resolves once every started task settled and the rest were refused.
//! - A completed pass resets itself; an aborted or timed-out pass keeps its status until
//!   `reset()` or the next `run()`.
//! - A pass in which every task settled counts as completed, even if `abort()` arrived
//!   after the last task had started.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use taskqueue::{Handler, RunOutcome, Runner, RunnerConfig, TaskConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), taskqueue::QueueError> {
//! let runner = Runner::new(RunnerConfig::default());
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..3 {
//!     let hits = Arc::clone(&hits);
//!     runner.add(Handler::sync(move |_| {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     }))?;
//! }
//! runner.add(TaskConfig::named("last").handler(Handler::sync(|_| {})))?;
//!
//! assert_eq!(runner.run(false).await, RunOutcome::Completed);
//! assert_eq!(hits.load(Ordering::SeqCst), 3);
//! assert_eq!(runner.get_task_by_index(0).unwrap().name(), "Task #1");
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::builder::RunnerBuilder;
use super::config::{RateLimit, RunnerConfig};
use super::control::RunControl;
use super::dispatch::{SettleHook, run_parallel, run_sequential};
use super::limiter::BatchRateLimiter;
use super::plan::{Plan, Progress, TaskSummary};
use super::status::RunnerStatus;
use super::throttle::ConcurrencyThrottle;
use crate::error::QueueError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::{Outcome, TaskCollection, TaskConfig, TaskRef, TaskTarget};

/// How a [`Runner::run`] pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task settled; `end` was published and the runner reset itself.
    Completed,
    /// The pass was aborted by a caller or a task and some tasks never ran.
    Aborted,
    /// The global timeout or a task timeout ended the pass before every task ran.
    TimedOut,
    /// A pass was already in progress; nothing was started.
    AlreadyRunning,
}

/// Identifies a task for [`Runner::remove`].
#[derive(Clone, Debug)]
pub enum TaskSelector {
    Name(String),
    Index(usize),
    Task(TaskRef),
}

impl From<&str> for TaskSelector {
    fn from(name: &str) -> Self {
        TaskSelector::Name(name.to_string())
    }
}

impl From<String> for TaskSelector {
    fn from(name: String) -> Self {
        TaskSelector::Name(name)
    }
}

impl From<usize> for TaskSelector {
    fn from(index: usize) -> Self {
        TaskSelector::Index(index)
    }
}

impl From<TaskRef> for TaskSelector {
    fn from(task: TaskRef) -> Self {
        TaskSelector::Task(task)
    }
}

impl From<&TaskRef> for TaskSelector {
    fn from(task: &TaskRef) -> Self {
        TaskSelector::Task(Arc::clone(task))
    }
}

#[derive(Default)]
struct RunState {
    status: RunnerStatus,
    active: bool,
    timer: Option<JoinHandle<()>>,
    active_task: Option<Arc<str>>,
}

struct Listener {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    name: Arc<str>,
    cfg: RwLock<RunnerConfig>,
    bus: Bus,
    queue: Mutex<TaskCollection>,
    state: Mutex<RunState>,
    token: Mutex<CancellationToken>,
    completed: AtomicUsize,
    total: AtomicUsize,
    listener: Mutex<Option<Listener>>,
}

/// Task-queue orchestrator.
///
/// Cheap to clone; clones drive the same queue.
#[derive(Clone)]
pub struct Runner {
    shared: Arc<Shared>,
}

impl Runner {
    /// Creates a runner without subscribers.
    pub fn new(cfg: RunnerConfig) -> Self {
        Self::with_subscribers(cfg, None)
    }

    /// Returns a builder for a runner with subscribers.
    pub fn builder(cfg: RunnerConfig) -> RunnerBuilder {
        RunnerBuilder::new(cfg)
    }

    pub(crate) fn with_subscribers(cfg: RunnerConfig, subs: Option<SubscriberSet>) -> Self {
        let name: Arc<str> = Arc::from(cfg.name.as_str());
        let bus = Bus::new(cfg.bus_capacity_clamped());

        let shared = Arc::new_cyclic(|me: &Weak<Shared>| {
            let control: Weak<dyn RunControl> = me.clone();
            Shared {
                queue: Mutex::new(TaskCollection::owned(
                    Arc::clone(&name),
                    bus.clone(),
                    control,
                )),
                name,
                cfg: RwLock::new(cfg),
                bus,
                state: Mutex::new(RunState::default()),
                token: Mutex::new(CancellationToken::new()),
                completed: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                listener: Mutex::new(None),
            }
        });

        if let Some(set) = subs {
            shared.spawn_listener(set);
        }
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // ---------------------------
    // Task management
    // ---------------------------

    /// Adds a task and returns it.
    ///
    /// - A missing name becomes `Task #<size + 1>`.
    /// - A name already in use gets ` (k)` appended with the lowest free `k`.
    /// - Fails with [`QueueError::InvalidConfiguration`] when no handler is given.
    /// - Adding during a pass is allowed but advisory: the task may not run in it.
    pub fn add(&self, cfg: impl Into<TaskConfig>) -> Result<TaskRef, QueueError> {
        let mut cfg = cfg.into();
        let task = {
            let mut queue = self.shared.lock_queue();
            let number = queue.len() + 1;
            let base = cfg
                .name
                .take()
                .unwrap_or_else(|| format!("Task #{number}"));

            let taken: HashSet<String> = queue.names().into_iter().collect();
            let mut name = base.clone();
            let mut k = 0;
            while taken.contains(&name) {
                k += 1;
                name = format!("{base} ({k})");
            }

            cfg.name = Some(name);
            cfg.number.get_or_insert(number);
            queue.add(cfg)?
        };

        if self.shared.is_active() {
            self.shared.advise(
                format!(
                    "\"{}\" was added to \"{}\" during execution; it is not guaranteed to run in the current pass",
                    task.name(),
                    self.shared.name
                ),
                Some(&task),
            );
        }

        self.shared.bus.publish(
            Event::new(EventKind::TaskCreated)
                .with_task(task.name())
                .with_number(task.number()),
        );
        Ok(task)
    }

    /// Removes a task by name, index or reference.
    ///
    /// Returns `None` (and logs a lookup failure) when nothing matches.
    pub fn remove(&self, target: impl Into<TaskSelector>) -> Option<TaskRef> {
        let target = target.into();
        let removed = {
            let mut queue = self.shared.lock_queue();
            let found = match &target {
                TaskSelector::Index(i) => queue.get(*i),
                TaskSelector::Name(n) => queue.find(n),
                TaskSelector::Task(t) => queue.position(t).map(|_| Arc::clone(t)),
            };
            let Some(task) = found else {
                let err = QueueError::lookup(match &target {
                    TaskSelector::Index(i) => format!("index {i}"),
                    TaskSelector::Name(n) => format!("task named \"{n}\""),
                    TaskSelector::Task(t) => format!("task \"{}\"", t.name()),
                });
                error!(queue = %self.shared.name, error = %err, "cannot remove task");
                return None;
            };
            if let Err(err) = queue.remove([TaskTarget::Task(Arc::clone(&task))]) {
                error!(queue = %self.shared.name, error = %err, "cannot remove task");
                return None;
            }
            task
        };

        if self.shared.is_active() {
            self.shared.advise(
                format!(
                    "\"{}\" was removed from \"{}\" during execution; it may still run in the current pass",
                    removed.name(),
                    self.shared.name
                ),
                Some(&removed),
            );
        }
        Some(removed)
    }

    pub fn get_task_by_index(&self, index: usize) -> Option<TaskRef> {
        self.shared.lock_queue().get(index)
    }

    pub fn get_task_by_name(&self, name: &str) -> Option<TaskRef> {
        self.shared.lock_queue().find(name)
    }

    // ---------------------------
    // Running
    // ---------------------------

    /// Runs every task once, in parallel or one after another.
    pub async fn run(&self, sequential: bool) -> RunOutcome {
        let sh = &self.shared;
        {
            let mut st = sh.lock_state();
            if st.active {
                drop(st);
                sh.advise(
                    format!(
                        "cannot start processing of \"{}\" (already running); wait for the current pass to complete",
                        sh.name
                    ),
                    None,
                );
                return RunOutcome::AlreadyRunning;
            }
            st.active = true;
            st.active_task = None;
        }

        let token = sh.renew_token();
        sh.completed.store(0, Ordering::SeqCst);
        let tasks = sh.lock_queue().tasks();
        sh.total.store(tasks.len(), Ordering::SeqCst);

        if tasks.is_empty() {
            sh.set_status(RunnerStatus::Pending);
            sh.lock_state().active = false;
            debug!(queue = %sh.name, "nothing to run");
            sh.bus.publish(Event::new(EventKind::RunEnded));
            self.reset();
            return RunOutcome::Completed;
        }

        sh.set_status(RunnerStatus::Running);
        let cfg = sh.config();
        if let Some(after) = cfg.run_timeout() {
            sh.arm_timer(after);
        }
        info!(queue = %sh.name, tasks = tasks.len(), sequential, "run started");

        let mut hook = Tracker { shared: sh };
        match (cfg.rate_limit, cfg.concurrency_limit()) {
            (Some(limit), max) => {
                let mut limiter = BatchRateLimiter::new(limit, tasks).with_cancel(token.clone());
                if let (false, Some(max)) = (sequential, max) {
                    limiter = limiter.with_max_concurrent(max);
                }
                limiter.bus().relay(&sh.bus, Some("limited."));
                limiter.run_with(sequential, &mut hook).await;
            }
            (None, Some(max)) if !sequential => {
                ConcurrencyThrottle::new(max, tasks)
                    .run_with(&mut hook)
                    .await;
            }
            _ if sequential => run_sequential(&tasks, &mut hook).await,
            _ => run_parallel(&tasks, &mut hook).await,
        }

        {
            let mut st = sh.lock_state();
            st.active = false;
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
        }

        // A pass in which every task settled ends normally, even if abort() came late.
        let all_done = sh.completed() == sh.total.load(Ordering::SeqCst);
        if token.is_cancelled() && !all_done {
            if sh.status() == RunnerStatus::Timeout {
                info!(queue = %sh.name, completed = sh.completed(), "run timed out");
                return RunOutcome::TimedOut;
            }
            sh.set_status(RunnerStatus::Aborted);
            info!(queue = %sh.name, completed = sh.completed(), "run aborted");
            return RunOutcome::Aborted;
        }

        info!(queue = %sh.name, completed = sh.completed(), "run ended");
        sh.bus.publish(Event::new(EventKind::RunEnded));
        self.reset();
        RunOutcome::Completed
    }

    /// Shorthand for `run(true)`.
    pub async fn run_sync(&self) -> RunOutcome {
        self.run(true).await
    }

    /// Aborts the current pass. Tasks already started run to completion.
    pub fn abort(&self) {
        self.shared.abort(false, None);
    }

    /// Alias for [`abort`](Self::abort).
    pub fn cancel(&self) {
        self.abort();
    }

    /// Returns every task to `pending` and the runner to `pending`.
    pub fn reset(&self) {
        let sh = &self.shared;
        sh.lock_queue().reset();
        sh.renew_token();
        if let Some(timer) = sh.lock_state().timer.take() {
            timer.abort();
        }
        sh.set_status(RunnerStatus::Pending);
        debug!(queue = %sh.name, "runner reset");
        sh.bus.publish(Event::new(EventKind::RunnerReset));
    }

    // ---------------------------
    // Configuration
    // ---------------------------

    /// Sets the global timeout for subsequent passes (`Duration::ZERO` disables it).
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.write_config().timeout = timeout;
    }

    /// Limits task starts to `max` per `duration` window.
    pub fn set_rate_limit(&self, max: usize, duration: Duration) -> Result<(), QueueError> {
        let limit = RateLimit::new(max, duration)?;
        self.shared.write_config().rate_limit = Some(limit);
        Ok(())
    }

    pub fn remove_rate_limit(&self) {
        self.shared.write_config().rate_limit = None;
    }

    /// Caps concurrently running tasks in parallel passes. Zero clears the cap.
    pub fn set_max_concurrent(&self, max: usize) {
        self.shared.write_config().max_concurrent = max;
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RunnerConfig {
        self.shared.config()
    }

    // ---------------------------
    // Introspection
    // ---------------------------

    pub fn size(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Tasks in insertion order. A task without a number reports its index instead.
    pub fn list(&self) -> Vec<TaskSummary> {
        self.shared
            .lock_queue()
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, t)| TaskSummary {
                number: if t.number() > 0 { t.number() } else { i },
                name: t.name().to_string(),
                status: t.status(),
            })
            .collect()
    }

    pub fn plan(&self) -> Plan {
        let progress = self.progress();
        Plan {
            tasks_remaining: progress.total.saturating_sub(progress.completed),
            tasks_completed: progress.completed,
            minimum_duration: self
                .shared
                .config()
                .rate_limit
                .map(|limit| limit.minimum_duration(progress.total)),
        }
    }

    /// Completion counters. Outside a pass, `total` is the current size.
    pub fn progress(&self) -> Progress {
        let total = if self.shared.is_active() {
            self.shared.total.load(Ordering::SeqCst)
        } else {
            self.size()
        };
        Progress {
            completed: self.shared.completed(),
            total,
        }
    }

    /// Returns `true` once the current (or last) pass was aborted or timed out.
    pub fn cancelled(&self) -> bool {
        self.shared.current_token().is_cancelled()
    }

    pub fn status(&self) -> RunnerStatus {
        self.shared.status()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_active()
    }

    /// Receives runner events, including relayed `task.*` and `limited.*` events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Stops forwarding events to subscribers and waits for their queues to drain.
    pub async fn shutdown(&self) {
        let listener = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.stop.cancel();
            let _ = listener.handle.await;
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .field("size", &self.size())
            .finish()
    }
}

impl RunControl for Shared {
    fn may_start(&self) -> bool {
        !self.current_token().is_cancelled()
    }

    fn abort(&self, timeout: bool, active: Option<&str>) {
        {
            let token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
            if token.is_cancelled() {
                return;
            }
            token.cancel();
        }

        let active: Option<Arc<str>> = {
            let mut st = self.lock_state();
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
            active.map(Arc::from).or_else(|| st.active_task.clone())
        };
        let (status, kind) = if timeout {
            (RunnerStatus::Timeout, EventKind::RunTimedOut)
        } else {
            (RunnerStatus::Aborting, EventKind::RunAborted)
        };
        self.set_status(status);

        warn!(queue = %self.name, task = ?active.as_deref(), timeout, "aborting run; unstarted tasks will not run");
        let ev = Event::new(kind);
        self.bus.publish(match active {
            Some(task) => ev.with_task(task),
            None => ev,
        });
    }
}

impl Shared {
    fn set_status(&self, status: RunnerStatus) {
        let old = {
            let mut st = self.lock_state();
            if st.status == status {
                return;
            }
            std::mem::replace(&mut st.status, status)
        };
        self.bus
            .publish(Event::new(EventKind::StatusChanged).with_change(old, status));
    }

    fn status(&self) -> RunnerStatus {
        self.lock_state().status
    }

    fn is_active(&self) -> bool {
        self.lock_state().active
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Replaces the cancellation token with a fresh one and returns it.
    fn renew_token(&self) -> CancellationToken {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    fn current_token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn arm_timer(self: &Arc<Self>, after: Duration) {
        let me = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(me) = me.upgrade() {
                debug!(queue = %me.name, ?after, "global timeout elapsed");
                me.abort(true, None);
            }
        });
        if let Some(old) = self.lock_state().timer.replace(handle) {
            old.abort();
        }
    }

    fn spawn_listener(&self, set: SubscriberSet) {
        let mut rx = self.bus.subscribe();
        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber listener lagged; events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            set.shutdown().await;
        });
        *self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Listener { stop, handle });
    }

    /// Logs an advisory warning and publishes it as a `warning` event.
    fn advise(&self, reason: String, task: Option<&TaskRef>) {
        warn!(queue = %self.name, "{reason}");
        let ev = Event::warning(reason);
        self.bus.publish(match task {
            Some(t) => ev.with_task(t.name()),
            None => ev,
        });
    }

    fn config(&self) -> RunnerConfig {
        self.cfg
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, RunnerConfig> {
        self.cfg.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> MutexGuard<'_, TaskCollection> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks the active task and counts completions of one pass.
struct Tracker<'a> {
    shared: &'a Shared,
}

impl SettleHook for Tracker<'_> {
    fn starting(&mut self, task: &TaskRef) {
        self.shared.lock_state().active_task = Some(Arc::from(task.name()));
    }

    fn settled(&mut self, _task: &TaskRef, outcome: Outcome) {
        if outcome.is_done() {
            self.shared.completed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Handler, TaskStatus};
    use tokio::time::Instant;

    fn pushing(log: &Arc<Mutex<Vec<usize>>>, value: usize, delay_ms: u64) -> Handler {
        let log = Arc::clone(log);
        if delay_ms == 0 {
            return Handler::sync(move |_| log.lock().unwrap().push(value));
        }
        Handler::future(move |_| {
            let log = Arc::clone(&log);
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().unwrap().push(value);
            }
        })
    }

    fn sleeping(counter: &Arc<AtomicUsize>, ms: u64) -> Handler {
        let counter = Arc::clone(counter);
        Handler::future(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    /// Sleeps for `ms` while recording the highest number of handlers running at once.
    fn watermarked(active: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>, ms: u64) -> Handler {
        let (active, peak) = (Arc::clone(active), Arc::clone(peak));
        Handler::future(move |_| {
            let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn add_names_numbers_and_dedupes() {
        let runner = Runner::new(RunnerConfig::default());
        let a = runner.add(Handler::sync(|_| {})).unwrap();
        let b = runner
            .add(TaskConfig::named("X").handler(Handler::sync(|_| {})))
            .unwrap();
        let c = runner
            .add(TaskConfig::named("X").handler(Handler::sync(|_| {})))
            .unwrap();
        let d = runner
            .add(TaskConfig::named("X").handler(Handler::sync(|_| {})))
            .unwrap();

        assert_eq!(a.name(), "Task #1");
        assert_eq!((b.name(), c.name(), d.name()), ("X", "X (1)", "X (2)"));
        assert_eq!(runner.size(), 4);
        let numbers: Vec<usize> = runner.list().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(runner.list().iter().all(|s| s.status == TaskStatus::Pending));

        let err = runner.add(TaskConfig::named("nothing")).unwrap_err();
        assert_eq!(err.as_label(), "queue_invalid_configuration");
        assert_eq!(runner.size(), 4);
    }

    #[test]
    fn remove_by_name_index_and_reference() {
        let runner = Runner::new(RunnerConfig::default());
        for name in ["a", "b", "c", "d"] {
            runner
                .add(TaskConfig::named(name).handler(Handler::sync(|_| {})))
                .unwrap();
        }

        assert_eq!(runner.remove("b").unwrap().name(), "b");
        assert_eq!(runner.remove(0usize).unwrap().name(), "a");
        let d = runner.get_task_by_name("d").unwrap();
        assert_eq!(runner.remove(&d).unwrap().name(), "d");
        assert!(d.queue().is_none());

        assert!(runner.remove("missing").is_none());
        assert!(runner.remove(7usize).is_none());
        assert!(runner.remove(d).is_none());
        assert_eq!(runner.size(), 1);
        assert_eq!(runner.get_task_by_index(0).unwrap().name(), "c");
    }

    #[tokio::test]
    async fn empty_run_ends_immediately() {
        let runner = Runner::new(RunnerConfig::default());
        let mut rx = runner.subscribe();
        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert!(drain(&mut rx).iter().any(|e| e.kind == EventKind::RunEnded));
        assert_eq!(runner.status(), RunnerStatus::Pending);
    }

    #[tokio::test]
    async fn parallel_sync_tasks_complete_before_end() {
        let runner = Runner::new(RunnerConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        for v in 1..=3 {
            runner.add(pushing(&log, v, 0)).unwrap();
        }
        let mut rx = runner.subscribe();

        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        let mut seen = log.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);

        let topics: Vec<String> = drain(&mut rx).iter().map(Event::topic).collect();
        let end = topics.iter().position(|t| t == "end").expect("end");
        assert_eq!(topics[..end].iter().filter(|t| *t == "task.done").count(), 3);
        assert_eq!(runner.plan().tasks_completed, 3);
        assert_eq!(runner.plan().tasks_remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_keeps_insertion_order_and_honors_skip() {
        let runner = Runner::new(RunnerConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.add(pushing(&log, 1, 0)).unwrap();
        runner.add(pushing(&log, 2, 50)).unwrap();
        runner.add(pushing(&log, 3, 0)).unwrap();

        assert_eq!(runner.run_sync().await, RunOutcome::Completed);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);

        log.lock().unwrap().clear();
        runner.get_task_by_index(1).unwrap().skip();
        assert_eq!(runner.run_sync().await, RunOutcome::Completed);
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
        assert_eq!(runner.plan().tasks_completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_stops_the_pass_once() {
        let runner = Runner::new(RunnerConfig {
            timeout: Duration::from_millis(500),
            ..RunnerConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            runner.add(sleeping(&counter, 400)).unwrap();
        }
        let mut rx = runner.subscribe();

        assert_eq!(runner.run_sync().await, RunOutcome::TimedOut);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(runner.status(), RunnerStatus::Timeout);
        assert!(runner.cancelled());

        let events = drain(&mut rx);
        let timeouts: Vec<&Event> = events
            .iter()
            .filter(|e| e.kind == EventKind::RunTimedOut)
            .collect();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].task.as_deref(), Some("Task #2"));
        assert!(!events.iter().any(|e| e.kind == EventKind::RunEnded));

        runner.reset();
        assert!(!runner.cancelled());
        assert_eq!(runner.status(), RunnerStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn late_abort_of_a_parallel_pass_still_ends() {
        let runner = Runner::new(RunnerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            runner.add(sleeping(&counter, 1000)).unwrap();
        }
        let mut rx = runner.subscribe();

        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(false).await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        runner.abort();
        runner.cancel();
        assert_eq!(runner.status(), RunnerStatus::Aborting);
        assert!(runner.cancelled());

        assert_eq!(pass.await.unwrap(), RunOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(runner.status(), RunnerStatus::Pending);
        assert!(!runner.cancelled());
        assert_eq!(runner.progress().completed, 50);

        let events = drain(&mut rx);
        let aborts = events.iter().filter(|e| e.kind == EventKind::RunAborted).count();
        assert_eq!(aborts, 1);
        let topics: Vec<String> = events.iter().map(Event::topic).collect();
        let end = topics.iter().position(|t| t == "end").expect("end");
        assert_eq!(topics[..end].iter().filter(|t| *t == "task.done").count(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_a_sequential_pass_after_the_active_task() {
        let runner = Runner::new(RunnerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            runner.add(sleeping(&counter, 1000)).unwrap();
        }

        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run_sync().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        runner.abort();

        assert_eq!(pass.await.unwrap(), RunOutcome::Aborted);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(runner.list()[1].status, TaskStatus::Pending);
        assert_eq!(runner.progress().completed, 1);
    }

    #[tokio::test]
    async fn task_abort_propagates_to_runner() {
        let runner = Runner::new(RunnerConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.add(pushing(&log, 1, 0)).unwrap();
        runner.add(Handler::sync(|ctx| ctx.abort())).unwrap();
        runner.add(pushing(&log, 3, 0)).unwrap();

        assert_eq!(runner.run_sync().await, RunOutcome::Aborted);
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(runner.list()[2].status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn task_timeout_times_out_the_run() {
        let runner = Runner::new(RunnerConfig::default());
        runner
            .add(
                TaskConfig::named("slow")
                    .timeout(Duration::from_millis(100))
                    .handler(Handler::future(|_| async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    })),
            )
            .unwrap();
        let follow = runner.add(Handler::sync(|_| {})).unwrap();

        assert_eq!(runner.run_sync().await, RunOutcome::TimedOut);
        assert_eq!(runner.status(), RunnerStatus::Timeout);
        assert_eq!(runner.list()[0].status, TaskStatus::TimedOut);
        assert_eq!(follow.status(), TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_spaces_batches() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_rate_limit(80, Duration::from_millis(300)).unwrap();
        for _ in 0..800 {
            runner.add(Handler::sync(|_| {})).unwrap();
        }

        let plan = runner.plan();
        assert_eq!(plan.tasks_remaining, 800);
        assert_eq!(plan.tasks_completed, 0);
        assert_eq!(plan.minimum_duration, Some(Duration::from_millis(3000)));

        let start = Instant::now();
        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(3000));

        let plan = runner.plan();
        assert_eq!(plan.tasks_completed, 800);
        assert_eq!(plan.tasks_remaining, 0);
        assert_eq!(runner.status(), RunnerStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_batches_are_relayed() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_rate_limit(5, Duration::from_millis(300)).unwrap();
        for _ in 0..50 {
            runner.add(Handler::sync(|_| {})).unwrap();
        }
        assert_eq!(
            runner.plan().minimum_duration,
            Some(Duration::from_millis(3000))
        );
        let mut rx = runner.subscribe();

        runner.run_sync().await;
        let ends = drain(&mut rx)
            .iter()
            .filter(|e| e.topic() == "limited.batch.end")
            .count();
        assert_eq!(ends, 10);

        runner.remove_rate_limit();
        assert_eq!(runner.plan().minimum_duration, None);
    }

    #[tokio::test(start_paused = true)]
    async fn max_concurrent_throttles_parallel_runs() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_max_concurrent(30);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            runner.add(sleeping(&counter, 100)).unwrap();
        }

        let start = Instant::now();
        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_abort_leaves_unstarted_pending() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_max_concurrent(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            runner.add(sleeping(&counter, 100)).unwrap();
        }

        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(false).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        runner.abort();

        assert_eq!(pass.await.unwrap(), RunOutcome::Aborted);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(runner.progress().completed, 4);
        let pending = runner
            .list()
            .iter()
            .filter(|s| s.status == TaskStatus::Pending)
            .count();
        assert_eq!(pending, 6);
        assert_eq!(runner.progress().ratio(), 0.4);
        assert_eq!(runner.status(), RunnerStatus::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_throttles_within_batches() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_rate_limit(6, Duration::from_millis(300)).unwrap();
        runner.set_max_concurrent(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            runner.add(watermarked(&active, &peak, 50)).unwrap();
        }

        let start = Instant::now();
        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(runner.progress().completed, 12);
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_ignores_max_concurrent() {
        let runner = Runner::new(RunnerConfig::default());
        runner.set_max_concurrent(30);
        let log = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for v in 1..=5 {
            runner.add(pushing(&log, v, (6 - v as u64) * 10)).unwrap();
            runner.add(watermarked(&active, &peak, 20)).unwrap();
        }

        let start = Instant::now();
        assert_eq!(runner.run_sync().await, RunOutcome::Completed);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn completed_pass_resets_and_replays() {
        let runner = Runner::new(RunnerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            runner
                .add(Handler::sync(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert!(runner.list().iter().all(|s| s.status == TaskStatus::Pending));
        assert_eq!(runner.run(false).await, RunOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_while_running_is_refused() {
        let runner = Runner::new(RunnerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        runner.add(sleeping(&counter, 100)).unwrap();
        let mut rx = runner.subscribe();

        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(false).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(runner.is_running());
        assert_eq!(runner.run(false).await, RunOutcome::AlreadyRunning);

        runner.add(Handler::sync(|_| {})).unwrap();
        assert_eq!(pass.await.unwrap(), RunOutcome::Completed);

        let warnings = drain(&mut rx)
            .iter()
            .filter(|e| e.kind == EventKind::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn skipping_a_running_task_warns_on_the_runner_bus() {
        let runner = Runner::new(RunnerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let task = runner.add(sleeping(&counter, 100)).unwrap();
        let mut rx = runner.subscribe();

        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(false).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.skip();
        assert_eq!(pass.await.unwrap(), RunOutcome::Completed);

        let warnings: Vec<Event> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.topic() == "task.warning")
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].task.as_deref(), Some("Task #1"));
        assert!(task.is_skip_requested());
    }

    #[test]
    fn invalid_rate_limit_is_rejected() {
        let runner = Runner::new(RunnerConfig::default());
        assert!(runner.set_rate_limit(0, Duration::from_millis(300)).is_err());
        assert!(runner.set_rate_limit(5, Duration::ZERO).is_err());
        assert!(runner.config().rate_limit.is_none());
    }

    #[tokio::test]
    async fn status_changes_are_published() {
        let runner = Runner::new(RunnerConfig::default());
        runner.add(Handler::sync(|_| {})).unwrap();
        let mut rx = runner.subscribe();
        runner.run(false).await;

        let changes: Vec<(RunnerStatus, RunnerStatus)> = drain(&mut rx)
            .iter()
            .filter_map(|e| e.change)
            .map(|c| (c.old, c.current))
            .collect();
        assert_eq!(
            changes,
            vec![
                (RunnerStatus::Pending, RunnerStatus::Running),
                (RunnerStatus::Running, RunnerStatus::Pending),
            ]
        );
    }
}
