//! Listenable futures: a future that accepts listeners and typed callbacks, fired after
//! completion (or immediately, if already complete).
//!
//! Three concrete shapes share the same completion core ([`core::FutureCore`]):
//! [`SettableFuture`] for cross-thread publication of a manually-produced result, and
//! [`TaskFuture`] for a future that owns the runnable/callable it will execute.

mod core;
mod settable;
mod state;
mod task_future;

use std::sync::Arc;
use std::time::Duration;

pub use settable::SettableFuture;
pub use state::FutureState;
pub use task_future::TaskFuture;

use crate::error::Result;
use crate::listener::{Executor, Listener};

/// A future whose eventual result (or failure, or cancellation) can be observed by listeners and
/// typed callbacks, in addition to being retrieved synchronously with `get`.
pub trait ListenableFuture<T>: Send + Sync {
    /// Blocks until this future reaches a terminal state, then returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ExecutionFailure`] if the future failed, or
    /// [`crate::error::Error::Cancelled`] if it was cancelled.
    fn get(&self) -> Result<Arc<T>>;

    /// As [`ListenableFuture::get`], but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Timeout`] if `timeout` elapses before completion, in
    /// addition to the failure/cancellation errors `get` can return.
    fn get_timeout(&self, timeout: Duration) -> Result<Arc<T>>;

    /// Returns `true` if this future has reached any terminal state.
    fn is_done(&self) -> bool;

    /// Returns `true` if this future was cancelled.
    fn is_cancelled(&self) -> bool;

    /// Attempts to transition `Pending -> Cancelled`. Returns `false` if already terminal.
    ///
    /// `may_interrupt_if_running` is accepted for interface parity but never aborts a task body
    /// already in progress; it only affects whether a worker that is merely waiting to start the
    /// task is released early (see [`crate::scheduler`]).
    fn cancel(&self, may_interrupt_if_running: bool) -> bool;

    /// Registers a no-argument listener, run on `executor` if given, inline otherwise.
    ///
    /// Fires once, after this future's first (and only) completion. If the future is already
    /// complete, fires immediately from within this call.
    fn add_listener(&self, listener: Arc<Listener>, executor: Option<Arc<dyn Executor>>);

    /// Registers typed success/failure callbacks, run on `executor` if given, inline otherwise.
    fn add_callback(
        &self,
        on_result: Arc<dyn Fn(&T) + Send + Sync>,
        on_failure: Arc<dyn Fn(&crate::error::Error) + Send + Sync>,
        executor: Option<Arc<dyn Executor>>,
    );
}
