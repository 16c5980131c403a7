//! # Task handlers and completion handles.
//!
//! A [`Handler`] is the work a [`Task`](crate::Task) performs. Whether the work is
//! synchronous or asynchronous is chosen when the handler is built, not inferred:
//!
//! - [`Handler::sync`]: runs inline; the task finishes as soon as the closure returns.
//! - [`Handler::with_done`]: receives a [`Done`] handle and finishes when `done.finish()`
//!   is called, from the returned future or from anything the handle was moved into.
//! - [`Handler::future`]: finishes when the returned future resolves.
//!
//! Asynchronous handlers produce a fresh future per run, which is spawned on the
//! current tokio runtime.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskqueue::Handler;
//!
//! let quick = Handler::sync(|ctx| println!("running {}", ctx.name()));
//!
//! let later = Handler::with_done(|_ctx, done| async move {
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         done.finish();
//!     });
//! });
//!
//! assert!(quick.is_sync());
//! assert!(!later.is_sync());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::tasks::{TaskContext, TaskRef};

/// Boxed future returned by asynchronous handlers.
pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type SyncFn = dyn Fn(&TaskContext) + Send + Sync + 'static;
type AsyncFn = dyn Fn(TaskContext, Done) -> BoxHandlerFuture + Send + Sync + 'static;

/// The work function of a task.
#[derive(Clone)]
pub enum Handler {
    /// Runs to completion inside `Task::run`.
    Sync(Arc<SyncFn>),
    /// Runs on the tokio runtime and finishes through its [`Done`] handle.
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wraps a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous closure that signals completion through [`Done`].
    ///
    /// The task stays `running` until `done.finish()` is called, even after the
    /// returned future has resolved.
    pub fn with_done<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext, Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::Async(Arc::new(
            move |ctx: TaskContext, done: Done| -> BoxHandlerFuture { Box::pin(f(ctx, done)) },
        ))
    }

    /// Wraps an asynchronous closure; the task finishes when its future resolves.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::with_done(move |ctx, done| {
            let fut = f(ctx);
            async move {
                fut.await;
                done.finish();
            }
        })
    }

    /// Returns `true` if the handler finishes inline.
    pub fn is_sync(&self) -> bool {
        matches!(self, Handler::Sync(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Completion handle passed to asynchronous handlers.
///
/// Calling [`Done::finish`] settles the task for the pass it was issued for; a
/// handle from an earlier pass (before a reset) is ignored. Dropping the handle
/// without finishing marks the task `failed` and settles it.
#[must_use = "the task stays running until `finish()` is called"]
pub struct Done {
    task: Option<TaskRef>,
    epoch: u64,
}

impl Done {
    pub(crate) fn new(task: TaskRef, epoch: u64) -> Self {
        Self {
            task: Some(task),
            epoch,
        }
    }

    /// Signals that the handler's work is complete.
    pub fn finish(mut self) {
        if let Some(task) = self.task.take() {
            task.finish(self.epoch);
        }
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abandon(self.epoch);
        }
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("task", &self.task.as_ref().map(|t| t.name().to_string()))
            .field("epoch", &self.epoch)
            .finish()
    }
}
