//! A future that is completed manually, typically from another thread.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::listener::{Executor, Listener};

use super::core::FutureCore;
use super::ListenableFuture;

/// A [`ListenableFuture`] completed exactly once by a call to [`SettableFuture::set_result`] or
/// [`SettableFuture::set_failure`].
///
/// Cloning shares the same underlying state: any clone can complete the future, and every clone
/// observes the same completion.
pub struct SettableFuture<T> {
    core: Arc<FutureCore<T>>,
}

impl<T> Clone for SettableFuture<T> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

impl<T: Send + Sync + 'static> Default for SettableFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> SettableFuture<T> {
    /// Creates a new, pending future.
    #[must_use]
    pub fn new() -> Self {
        Self { core: Arc::new(FutureCore::new()) }
    }

    /// Completes the future successfully with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the future was already completed or cancelled.
    pub fn set_result(&self, value: T) -> Result<()> {
        self.core.complete(Ok(value))
    }

    /// Completes the future with a failure.
    ///
    /// `error: None` substitutes a synthetic [`Error::ExecutionFailure`] so `get()` always has a
    /// cause to expose, matching the "`setFailure(null)`" contract.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the future was already completed or cancelled.
    pub fn set_failure(&self, error: Option<Error>) -> Result<()> {
        let error = error.unwrap_or_else(|| Error::ExecutionFailure {
            cause: "setFailure(None): no cause was supplied".to_string(),
        });
        self.core.complete(Err(error))
    }
}

impl<T: Send + Sync + 'static> ListenableFuture<T> for SettableFuture<T> {
    fn get(&self) -> Result<Arc<T>> {
        self.core.get()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<Arc<T>> {
        self.core.get_timeout(timeout)
    }

    fn is_done(&self) -> bool {
        self.core.is_done()
    }

    fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    fn cancel(&self, _may_interrupt_if_running: bool) -> bool {
        self.core.cancel()
    }

    fn add_listener(&self, listener: Arc<Listener>, executor: Option<Arc<dyn Executor>>) {
        self.core.add_listener(listener, executor);
    }

    fn add_callback(
        &self,
        on_result: Arc<dyn Fn(&T) + Send + Sync>,
        on_failure: Arc<dyn Fn(&Error) + Send + Sync>,
        executor: Option<Arc<dyn Executor>>,
    ) {
        self.core.add_callback(on_result, on_failure, executor);
    }
}
