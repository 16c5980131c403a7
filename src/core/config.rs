//! # Runner configuration.
//!
//! Provides [`RunnerConfig`] and [`RateLimit`].
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited
//! - `timeout = 0s` → no global run timeout
//! - `rate_limit = None` → tasks are not batched

use std::time::Duration;

use crate::error::QueueError;

/// At most `max` task starts per `duration` window.
///
/// Both values are validated on construction:
/// ```rust
/// use std::time::Duration;
/// use taskqueue::RateLimit;
///
/// let limit = RateLimit::new(80, Duration::from_millis(300)).unwrap();
/// assert_eq!(limit.batches(800), 10);
/// assert_eq!(limit.minimum_duration(800), Duration::from_millis(3000));
///
/// assert!(RateLimit::new(0, Duration::from_secs(1)).is_err());
/// assert!(RateLimit::new(5, Duration::ZERO).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    max: usize,
    duration: Duration,
}

impl RateLimit {
    pub fn new(max: usize, duration: Duration) -> Result<Self, QueueError> {
        if max == 0 {
            return Err(QueueError::config(
                "rate limit requires a positive maximum number of tasks per window",
            ));
        }
        if duration.is_zero() {
            return Err(QueueError::config(
                "rate limit requires a positive window duration",
            ));
        }
        Ok(Self { max, duration })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of batches needed for `total` tasks.
    pub fn batches(&self, total: usize) -> usize {
        total.div_ceil(self.max)
    }

    /// Lower bound on the wall time for `total` tasks: `total / max * duration`.
    pub fn minimum_duration(&self, total: usize) -> Duration {
        let nanos = self.duration.as_nanos() * total as u128 / self.max as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Configuration of a [`Runner`](crate::Runner).
///
/// ## Field semantics
/// - `name`: name of the runner-owned task collection (used in logs and events)
/// - `timeout`: global timeout for a whole run (`0s` = none)
/// - `rate_limit`: optional batching of task starts
/// - `max_concurrent`: cap on simultaneously running tasks in parallel runs (`0` = unlimited)
/// - `bus_capacity`: runner event bus ring buffer size (min 1)
///
/// All fields are public. Prefer the accessors over checking sentinels directly.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub name: String,

    /// Global run timeout.
    ///
    /// When it elapses the run is aborted with `timeout` semantics: status becomes
    /// `timeout` and no further tasks are started.
    pub timeout: Duration,

    pub rate_limit: Option<RateLimit>,

    /// Maximum number of tasks running at once.
    ///
    /// Ignored for sequential runs. Combined with a rate limit, it throttles the
    /// tasks of each batch.
    pub max_concurrent: usize,

    /// Capacity of the runner's broadcast channel.
    ///
    /// Receivers lagging more than `bus_capacity` events get `Lagged` and skip the oldest.
    pub bus_capacity: usize,
}

impl RunnerConfig {
    /// Returns the global run timeout as an `Option`.
    #[inline]
    pub fn run_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` concurrent tasks
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for RunnerConfig {
    /// Default configuration:
    ///
    /// - `name = "queue"`
    /// - `timeout = 0s` (no global timeout)
    /// - `rate_limit = None`
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            timeout: Duration::ZERO,
            rate_limit: None,
            max_concurrent: 0,
            bus_capacity: 1024,
        }
    }
}
