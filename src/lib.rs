//! `pendulum` is a dynamic delay queue, priority task scheduler, and listenable-future toolkit for
//! building executors.
//!
//! # Layout
//!
//! - [`delay_queue`]: the blocking priority queue every other component is built on.
//! - [`scheduler`]: a fixed-size worker pool driven by a [`delay_queue::DelayQueue`], with
//!   one-shot and recurring (fixed-delay / fixed-rate) submission.
//! - [`future`]: [`future::ListenableFuture`], its settable and task-owning implementations.
//! - [`listener`]: the completion fan-out primitive [`future`] and recurring tasks share.
//! - [`rate_limiter`]: paces submissions onto a [`scheduler::PriorityScheduler`] to a configured
//!   permits-per-second budget.
//! - [`clock`] / [`sequence`]: internal building blocks exposed for benchmarking and advanced
//!   embedding; most callers never name them directly.
//! - [`error`]: the crate-wide [`error::Error`] and [`error::Result`].

pub mod clock;
pub mod delay_queue;
pub mod error;
pub mod future;
pub mod listener;
pub mod rate_limiter;
pub mod scheduler;
pub mod sequence;
mod sync;

pub use error::{Error, Result};
pub use future::{ListenableFuture, SettableFuture, TaskFuture};
pub use rate_limiter::{RateLimiterConfig, RateLimiterExecutor};
pub use scheduler::{PendingTask, Priority, PriorityScheduler, Recurrence, ScheduledFuture, SchedulerConfig};
