//! Error types used by the task queue.
//!
//! [`QueueError`] covers every failure the engine reports to a caller:
//!
//! - `InvalidConfiguration`: a task without a handler, or a bad rate limit.
//! - `InvalidArgument`: malformed parameters to collection add/remove.
//! - `LookupFailure`: a removal that targets a task which does not exist.
//!
//! Timeouts, aborts and task failures are **not** errors: they surface through
//! task/runner status values and bus events.

use thiserror::Error;

/// # Errors produced by the task queue.
///
/// Configuration and argument errors are always returned synchronously and are
/// never retried. Lookup failures are usually logged and turned into `None` by
/// the [`Runner`](crate::Runner); the collection returns them as `Err`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A task or runner was configured with unusable values.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// A collection operation received a parameter it cannot work with.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },

    /// The requested task does not exist.
    #[error("task not found: {target}")]
    LookupFailure {
        /// Name or index that was looked up.
        target: String,
    },
}

impl QueueError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        QueueError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        QueueError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn lookup(target: impl Into<String>) -> Self {
        QueueError::LookupFailure {
            target: target.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskqueue::QueueError;
    ///
    /// let err = QueueError::LookupFailure { target: "index 7".into() };
    /// assert_eq!(err.as_label(), "queue_lookup_failure");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::InvalidConfiguration { .. } => "queue_invalid_configuration",
            QueueError::InvalidArgument { .. } => "queue_invalid_argument",
            QueueError::LookupFailure { .. } => "queue_lookup_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            QueueError::InvalidConfiguration { reason } => format!("configuration: {reason}"),
            QueueError::InvalidArgument { reason } => format!("argument: {reason}"),
            QueueError::LookupFailure { target } => format!("no task matches {target}"),
        }
    }
}
