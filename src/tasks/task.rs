//! # Task: a single unit of work with a status state machine.
//!
//! ## Lifecycle
//! ```text
//! run()
//!   ├─ status != Pending            → no-op          (Outcome::Inactive)
//!   ├─ runner refuses (aborted)     → stays Pending  (Outcome::Refused)
//!   ├─ skip requested               → Skipped → finish
//!   └─ Running → handler(ctx[, done])
//!         ├─ Sync handler returns   → finish
//!         ├─ done.finish()          → finish
//!         ├─ ctx.fail()             → Failed (finish later)
//!         ├─ timer fires            → TimedOut → runner.abort(timeout) → finish
//!         └─ ctx.abort()            → runner.abort() (or finish when unattached)
//!
//! finish: cancel timer, Running → Complete, publish `complete` + `done`, settle Completion
//! ```
//!
//! ## Rules
//! - Each run has an **epoch**; completion handles and contexts of older runs are ignored.
//! - Status guards make every second arrival a no-op (timer vs. done races).
//! - At most one timer is live; re-arming replaces it, finishing cancels it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::RunControl;
use crate::error::QueueError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Done, Handler, TaskContext, TaskStatus};

/// Shared handle to a task.
pub type TaskRef = Arc<Task>;

/// Raw task configuration, turned into a [`Task`] by [`Task::new`] or a collection.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use taskqueue::{Handler, Task, TaskConfig};
///
/// let task = Task::new(
///     TaskConfig::named("fetch")
///         .handler(Handler::sync(|_ctx| {}))
///         .timeout(Duration::from_secs(5)),
/// )
/// .unwrap();
/// assert_eq!(task.name(), "fetch");
///
/// assert!(Task::new(TaskConfig::named("no-handler")).is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TaskConfig {
    pub(crate) name: Option<String>,
    pub(crate) handler: Option<Handler>,
    pub(crate) number: Option<usize>,
    pub(crate) timeout: Option<Duration>,
}

impl TaskConfig {
    /// Creates an empty configuration (no name, no handler).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Overrides the display number.
    pub fn number(mut self, number: usize) -> Self {
        self.number = Some(number);
        self
    }

    /// Per-task timeout, armed when the task starts. Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<Handler> for TaskConfig {
    fn from(handler: Handler) -> Self {
        TaskConfig::new().handler(handler)
    }
}

/// Result of awaiting a [`Completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The task ran (or was skipped) and settled with this status.
    Settled(TaskStatus),
    /// `run()` was a no-op because the task was not pending.
    Inactive(TaskStatus),
    /// The owning runner refused the start; the task is still pending.
    Refused,
    /// The task was reset before it settled.
    Interrupted,
}

impl Outcome {
    /// Returns `true` if the task reported done for this pass.
    pub fn is_done(self) -> bool {
        matches!(self, Outcome::Settled(_))
    }
}

/// Future returned by [`Task::run`]; resolves once the task settles.
///
/// The task starts when `run()` is called, not when the completion is polled.
#[must_use = "a completion does nothing unless awaited; the task is already running"]
pub struct Completion {
    state: CompletionState,
}

enum CompletionState {
    Ready(Outcome),
    Waiting(oneshot::Receiver<TaskStatus>),
}

impl Completion {
    fn ready(outcome: Outcome) -> Self {
        Self {
            state: CompletionState::Ready(outcome),
        }
    }

    fn waiting(rx: oneshot::Receiver<TaskStatus>) -> Self {
        Self {
            state: CompletionState::Waiting(rx),
        }
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        match &mut self.get_mut().state {
            CompletionState::Ready(outcome) => Poll::Ready(*outcome),
            CompletionState::Waiting(rx) => Pin::new(rx).poll(cx).map(|res| match res {
                Ok(status) => Outcome::Settled(status),
                Err(_) => Outcome::Interrupted,
            }),
        }
    }
}

/// Link to the collection (and runner) that owns a task.
struct Link {
    queue: Arc<str>,
    bus: Bus,
    control: Option<Weak<dyn RunControl>>,
}

#[derive(Default)]
struct State {
    status: TaskStatus,
    skip: bool,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    settle: Option<oneshot::Sender<TaskStatus>>,
}

/// A single schedulable unit of work.
pub struct Task {
    name: Arc<str>,
    number: usize,
    handler: Handler,
    timeout: Option<Duration>,
    bus: Bus,
    link: RwLock<Option<Link>>,
    state: Mutex<State>,
}

impl Task {
    /// Builds a task from raw configuration.
    ///
    /// Fails with [`QueueError::InvalidConfiguration`] when no handler is given.
    /// A missing name becomes `Task #<number>`.
    pub fn new(cfg: TaskConfig) -> Result<TaskRef, QueueError> {
        let number = cfg.number.unwrap_or(0);
        let name = cfg.name.unwrap_or_else(|| format!("Task #{number}"));
        let Some(handler) = cfg.handler else {
            return Err(QueueError::config(format!(
                "\"{name}\" expected a handler to process, but none was configured"
            )));
        };
        Ok(Arc::new(Self {
            name: Arc::from(name),
            number,
            handler,
            timeout: cfg.timeout.filter(|d| !d.is_zero()),
            bus: Bus::default(),
            link: RwLock::new(None),
            state: Mutex::new(State::default()),
        }))
    }

    /// Shorthand for a named task with a handler.
    pub fn arc(name: impl Into<String>, handler: Handler) -> TaskRef {
        Arc::new(Self {
            name: Arc::from(name.into()),
            number: 0,
            handler,
            timeout: None,
            bus: Bus::default(),
            link: RwLock::new(None),
            state: Mutex::new(State::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_state().status
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_skip_requested(&self) -> bool {
        self.lock_state().skip
    }

    /// Name of the owning collection, if attached.
    pub fn queue(&self) -> Option<Arc<str>> {
        self.read_link().as_ref().map(|l| Arc::clone(&l.queue))
    }

    /// Receives this task's own (un-prefixed) events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Requests that the task be skipped instead of run.
    ///
    /// The request is recorded unconditionally and survives resets. If the task is
    /// already running or finished, a warning notes that it cannot apply to this pass.
    pub fn skip(&self) {
        let status = {
            let mut st = self.lock_state();
            st.skip = true;
            st.status
        };
        let why = match status {
            TaskStatus::Running => Some("currently running"),
            TaskStatus::TimedOut => Some("timed out"),
            TaskStatus::Complete => Some("already completed"),
            _ => None,
        };
        if let Some(why) = why {
            let reason = format!(
                "\"{}\" cannot be skipped ({why}); it will be skipped next pass",
                self.name
            );
            warn!(task = %self.name, queue = ?self.queue(), "{reason}");
            self.bus.publish(
                Event::warning(reason)
                    .with_task(Arc::clone(&self.name))
                    .with_number(self.number),
            );
        }
    }

    /// Withdraws a previous [`skip`](Self::skip) request.
    pub fn unskip(&self) {
        self.lock_state().skip = false;
    }

    /// Returns the task to `pending`, cancelling its timer.
    ///
    /// A completion still waiting on the previous pass resolves to [`Outcome::Interrupted`].
    pub fn reset(&self) {
        {
            let mut st = self.lock_state();
            st.status = TaskStatus::Pending;
            st.epoch += 1;
            st.settle = None;
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
        }
        debug!(task = %self.name, "task reset");
        self.emit(EventKind::TaskReset);
    }

    /// Starts the task and returns a future that resolves when it settles.
    ///
    /// Starting happens synchronously: by the time `run()` returns, the task is
    /// `running` (or skipped/finished for synchronous handlers). Asynchronous
    /// handlers and timers require a tokio runtime.
    pub fn run(self: &Arc<Self>) -> Completion {
        let allowed = self.control().is_none_or(|c| c.may_start());
        let mut st = self.lock_state();
        if st.status != TaskStatus::Pending {
            return Completion::ready(Outcome::Inactive(st.status));
        }
        if !allowed {
            debug!(task = %self.name, "run aborted; task not started");
            return Completion::ready(Outcome::Refused);
        }

        st.epoch += 1;
        let epoch = st.epoch;
        let (tx, rx) = oneshot::channel();
        st.settle = Some(tx);

        if st.skip {
            st.status = TaskStatus::Skipped;
            drop(st);
            warn!(task = %self.name, queue = ?self.queue(), "skipped task");
            self.emit(EventKind::TaskSkipped);
            self.finish(epoch);
            return Completion::waiting(rx);
        }

        st.status = TaskStatus::Running;
        drop(st);
        info!(task = %self.name, number = self.number, queue = ?self.queue(), "started processing");
        self.emit(EventKind::TaskStarted);

        if let Some(after) = self.timeout {
            self.arm_timer(epoch, after);
        }

        let ctx = TaskContext::new(Arc::clone(self), epoch);
        match &self.handler {
            Handler::Sync(f) => {
                f(&ctx);
                self.finish(epoch);
            }
            Handler::Async(f) => {
                let fut = f(ctx, Done::new(Arc::clone(self), epoch));
                tokio::spawn(fut);
            }
        }
        Completion::waiting(rx)
    }

    // ---------------------------
    // Collection wiring
    // ---------------------------

    pub(crate) fn attach(
        &self,
        queue: Arc<str>,
        bus: &Bus,
        control: Option<Weak<dyn RunControl>>,
    ) -> Result<(), QueueError> {
        let mut link = self.link.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = link.as_ref() {
            return Err(QueueError::argument(format!(
                "task \"{}\" already belongs to the \"{}\" queue",
                self.name, existing.queue
            )));
        }
        self.bus.relay(bus, Some("task."));
        *link = Some(Link {
            queue,
            bus: bus.clone(),
            control,
        });
        Ok(())
    }

    pub(crate) fn detach(&self) {
        let link = self
            .link
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            self.bus.unrelay(&link.bus);
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.read_link().is_some()
    }

    // ---------------------------
    // Transitions (epoch-guarded)
    // ---------------------------

    pub(crate) fn finish(&self, epoch: u64) {
        let settled = {
            let mut st = self.lock_state();
            if st.epoch != epoch {
                return;
            }
            let Some(tx) = st.settle.take() else {
                return;
            };
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
            if !st.status.is_terminal() {
                st.status = TaskStatus::Complete;
            }
            (st.status, tx)
        };
        let (status, tx) = settled;
        info!(task = %self.name, %status, "finished processing");
        self.bus.publish(self.event(EventKind::TaskCompleted).with_status(status));
        self.emit(EventKind::TaskDone);
        let _ = tx.send(status);
    }

    pub(crate) fn abandon(&self, epoch: u64) {
        {
            let mut st = self.lock_state();
            if st.epoch != epoch || st.settle.is_none() {
                return;
            }
            if st.status == TaskStatus::Running {
                st.status = TaskStatus::Failed;
            }
        }
        warn!(task = %self.name, "completion handle dropped before finish; marking task failed");
        self.emit(EventKind::TaskFailed);
        self.finish(epoch);
    }

    pub(crate) fn mark_failed(&self, epoch: u64) {
        {
            let mut st = self.lock_state();
            if st.epoch != epoch || st.status != TaskStatus::Running {
                return;
            }
            st.status = TaskStatus::Failed;
        }
        self.emit(EventKind::TaskFailed);
    }

    pub(crate) fn request_abort(&self, epoch: u64) {
        if self.lock_state().epoch != epoch {
            return;
        }
        self.emit(EventKind::TaskAborted);
        match self.control() {
            Some(control) => control.abort(false, Some(&self.name)),
            None => self.finish(epoch),
        }
    }

    pub(crate) fn arm_timer(self: &Arc<Self>, epoch: u64, after: Duration) {
        if after.is_zero() {
            return;
        }
        let mut st = self.lock_state();
        if st.epoch != epoch || st.status != TaskStatus::Running {
            return;
        }
        if let Some(old) = st.timer.take() {
            old.abort();
        }
        let me = Arc::clone(self);
        st.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            me.fire_timeout(epoch, Some(after));
        }));
    }

    pub(crate) fn fire_timeout(&self, epoch: u64, after: Option<Duration>) {
        {
            let mut st = self.lock_state();
            if st.epoch != epoch || st.settle.is_none() || st.status != TaskStatus::Running {
                return;
            }
            st.status = TaskStatus::TimedOut;
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
        }
        info!(task = %self.name, queue = ?self.queue(), after = ?after, "task timed out");
        let ev = self.event(EventKind::TaskTimedOut);
        self.bus.publish(match after {
            Some(d) => ev.with_timeout(d),
            None => ev,
        });
        if let Some(control) = self.control() {
            control.abort(true, Some(&self.name));
        }
        self.finish(epoch);
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_task(Arc::clone(&self.name))
            .with_number(self.number)
    }

    fn emit(&self, kind: EventKind) {
        self.bus.publish(self.event(kind));
    }

    fn control(&self) -> Option<Arc<dyn RunControl>> {
        self.read_link()
            .as_ref()
            .and_then(|l| l.control.as_ref())
            .and_then(Weak::upgrade)
    }

    fn read_link(&self) -> std::sync::RwLockReadGuard<'_, Option<Link>> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("number", &self.number)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Handler {
        let c = Arc::clone(counter);
        Handler::sync(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn missing_handler_is_invalid_configuration() {
        let err = Task::new(TaskConfig::named("t")).unwrap_err();
        assert_eq!(err.as_label(), "queue_invalid_configuration");
    }

    #[test]
    fn unnamed_config_gets_numbered_name() {
        let t = Task::new(TaskConfig::new().number(4).handler(Handler::sync(|_| {}))).unwrap();
        assert_eq!(t.name(), "Task #4");
        assert_eq!(t.number(), 4);
    }

    #[tokio::test]
    async fn sync_handler_completes_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t = Task::arc("t", counting(&counter));
        let mut rx = t.subscribe();

        let done = t.run();
        assert_eq!(t.status(), TaskStatus::Complete);
        assert_eq!(done.await, Outcome::Settled(TaskStatus::Complete));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let topics: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.topic())
            .collect();
        assert_eq!(topics, vec!["start", "complete", "done"]);
    }

    #[tokio::test]
    async fn run_twice_is_a_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t = Task::arc("t", counting(&counter));
        t.run().await;
        assert_eq!(t.run().await, Outcome::Inactive(TaskStatus::Complete));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_prevents_handler_and_survives_reset() {
        let counter = Arc::new(AtomicUsize::new(0));
        let t = Task::arc("t", counting(&counter));
        t.skip();
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::Skipped));

        t.reset();
        assert_eq!(t.status(), TaskStatus::Pending);
        assert!(t.is_skip_requested());
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::Skipped));

        t.reset();
        t.unskip();
        t.run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_while_finished_is_recorded() {
        let t = Task::arc("t", Handler::sync(|_| {}));
        t.run().await;
        let mut rx = t.subscribe();
        t.skip();
        assert!(t.is_skip_requested());
        assert_eq!(t.status(), TaskStatus::Complete);

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::Warning);
        assert_eq!(ev.task.as_deref(), Some("t"));
        assert!(ev.reason.as_deref().unwrap().contains("already completed"));

        t.reset();
        t.skip();
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::TaskReset);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fail_marks_failed_and_still_finishes() {
        let t = Task::arc("t", Handler::sync(|ctx| ctx.fail()));
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::Failed));
        assert_eq!(t.status(), TaskStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn done_handle_finishes_later() {
        let t = Task::arc(
            "later",
            Handler::with_done(|_ctx, done| async move {
                tokio::time::sleep(Duration::from_millis(700)).await;
                done.finish();
            }),
        );
        let completion = t.run();
        assert_eq!(t.status(), TaskStatus::Running);
        assert_eq!(completion.await, Outcome::Settled(TaskStatus::Complete));
    }

    #[tokio::test]
    async fn dropped_done_marks_failed() {
        let t = Task::arc("dropper", Handler::with_done(|_ctx, done| async move { drop(done) }));
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn context_timeout_fires_and_late_done_is_ignored() {
        let t = Task::arc(
            "slow",
            Handler::with_done(|ctx, done| async move {
                ctx.timeout(Some(Duration::from_millis(500)));
                tokio::time::sleep(Duration::from_secs(2)).await;
                done.finish();
            }),
        );
        let mut rx = t.subscribe();
        let outcome = t.run().await;
        assert_eq!(outcome, Outcome::Settled(TaskStatus::TimedOut));

        let timed_out = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.kind == EventKind::TaskTimedOut)
            .expect("timeout event");
        assert_eq!(timed_out.timeout_ms, Some(500));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(t.status(), TaskStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_is_armed_on_start() {
        let t = Task::new(
            TaskConfig::named("cfg")
                .timeout(Duration::from_millis(100))
                .handler(Handler::with_done(|_ctx, done| async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    done.finish();
                })),
        )
        .unwrap();
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::TimedOut));
    }

    #[tokio::test]
    async fn unattached_abort_finishes_locally() {
        let t = Task::arc("t", Handler::with_done(|ctx, done| async move {
            ctx.abort();
            drop(done);
        }));
        assert_eq!(t.run().await, Outcome::Settled(TaskStatus::Complete));
    }

    #[tokio::test]
    async fn reset_interrupts_pending_completion() {
        let t = Task::arc("t", Handler::with_done(|_ctx, done| async move {
            std::future::pending::<()>().await;
            done.finish();
        }));
        let completion = t.run();
        t.reset();
        assert_eq!(completion.await, Outcome::Interrupted);
        assert_eq!(t.status(), TaskStatus::Pending);
    }
}
