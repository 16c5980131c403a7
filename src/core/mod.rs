//! Runtime core: orchestration and execution policies.
//!
//! The public entry point is [`Runner`], which owns a task collection and picks an
//! execution policy per pass. The policies are usable on their own:
//!
//! - [`runner`]: the orchestrator, its status machine and cancellation token;
//! - [`builder`]: wires subscribers into a runner;
//! - [`config`]: [`RunnerConfig`] and [`RateLimit`];
//! - [`throttle`]: sliding-window concurrency limit;
//! - [`limiter`]: batched rate limit with a minimum duration per batch;
//! - [`dispatch`]: plain parallel/sequential dispatch and the [`SettleHook`] seam;
//! - [`control`]: the narrow capability tasks get from their runner.

mod builder;
mod config;
mod control;
mod dispatch;
mod limiter;
mod plan;
mod runner;
mod status;
mod throttle;

pub(crate) use control::RunControl;

pub use builder::RunnerBuilder;
pub use config::{RateLimit, RunnerConfig};
pub use dispatch::{SettleHook, run_parallel, run_sequential};
pub use limiter::BatchRateLimiter;
pub use plan::{Plan, Progress, TaskSummary};
pub use runner::{RunOutcome, Runner, TaskSelector};
pub use status::RunnerStatus;
pub use throttle::ConcurrencyThrottle;
