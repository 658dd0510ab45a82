//! Shared completion machinery behind every concrete future type in this crate.
//!
//! Draws the same split a oneshot channel draws between its `Sender` and `Receiver` halves: one
//! side (`complete`) may only ever run once per future, the other (`get`/listeners) may be read
//! from any number of threads. Here both sides live on the same handle because, unlike a oneshot
//! channel, a `ListenableFuture` is meant to be cloned and shared freely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::listener::{Executor, Listener, ListenerHelper};

use super::state::FutureState;

/// Completion state, waiters, and listener fan-out for one future.
pub(crate) struct FutureCore<T> {
    state: Mutex<FutureState<T>>,
    condvar: Condvar,
    listeners: ListenerHelper,
}

impl<T: Send + Sync + 'static> Default for FutureCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> FutureCore<T> {
    /// Creates a future whose listeners/callbacks fire exactly once, on its single completion.
    pub(crate) fn new() -> Self {
        Self::with_mode(true)
    }

    /// `call_once = false` is for a recurring [`super::TaskFuture`]: the future visits a terminal
    /// state and resets to `Pending` once per run, and listeners must fire on every such visit.
    pub(crate) fn with_mode(call_once: bool) -> Self {
        Self {
            state: Mutex::new(FutureState::Pending),
            condvar: Condvar::new(),
            listeners: ListenerHelper::construct(call_once),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.lock().is_terminal()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.lock().is_cancelled()
    }

    /// Attempts `Pending -> Cancelled`. Returns `false` if already terminal.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = FutureState::Cancelled;
        drop(state);
        self.condvar.notify_all();
        self.fire_listeners();
        true
    }

    /// Transitions `Pending -> Succeeded`/`Failed`. Returns `Err(IllegalState)` if already
    /// terminal, matching "a second call in any combination fails".
    pub(crate) fn complete(&self, result: std::result::Result<T, Error>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return Err(Error::illegal_state(
                    "future already completed; setResult/setFailure may only run once",
                ));
            }
            *state = match result {
                Ok(value) => FutureState::Succeeded(Arc::new(value)),
                Err(err) => FutureState::Failed(Arc::new(err)),
            };
        }
        self.condvar.notify_all();
        self.fire_listeners();
        Ok(())
    }

    /// Drives one run cycle for a [`super::TaskFuture`]: transitions `Pending -> terminal`,
    /// notifies waiters, fires listeners, then (only if `recurring` and the run succeeded) resets
    /// back to `Pending` for the next run.
    ///
    /// Callers must ensure no two cycles run concurrently on the same core (the scheduler enforces
    /// this with its own-overlap guard); this method does not itself synchronize against that.
    pub(crate) fn run_cycle(&self, result: std::result::Result<T, Error>, recurring: bool) {
        let succeeded = result.is_ok();
        {
            let mut state = self.state.lock();
            *state = match result {
                Ok(value) => FutureState::Succeeded(Arc::new(value)),
                Err(err) => FutureState::Failed(Arc::new(err)),
            };
        }
        self.condvar.notify_all();
        self.fire_listeners();
        if recurring && succeeded {
            *self.state.lock() = FutureState::Pending;
        }
    }

    fn fire_listeners(&self) {
        // `call_listeners` on a one-shot helper fails only on a second call; completion happens
        // at most once, so this can never observe `IllegalState`.
        let _ = self.listeners.call_listeners();
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) fn get(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock();
        while !state.is_terminal() {
            self.condvar.wait(&mut state);
        }
        Self::terminal_to_result(&state)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) fn get_timeout(&self, timeout: Duration) -> Result<Arc<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_terminal() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(timeout));
            }
            self.condvar.wait_for(&mut state, remaining);
        }
        Self::terminal_to_result(&state)
    }

    fn terminal_to_result(state: &FutureState<T>) -> Result<Arc<T>> {
        match state {
            FutureState::Succeeded(v) => Ok(Arc::clone(v)),
            FutureState::Failed(e) => Err(Error::ExecutionFailure { cause: e.to_string() }),
            FutureState::Cancelled => Err(Error::Cancelled),
            FutureState::Pending => unreachable!("loop only exits once terminal"),
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<Listener>, executor: Option<Arc<dyn Executor>>) {
        self.listeners.add_listener(listener, executor);
    }

    pub(crate) fn add_callback(
        self: &Arc<Self>,
        on_result: Arc<dyn Fn(&T) + Send + Sync>,
        on_failure: Arc<dyn Fn(&Error) + Send + Sync>,
        executor: Option<Arc<dyn Executor>>,
    ) {
        let core = Arc::clone(self);
        let listener: Arc<Listener> = Arc::new(move || {
            let state = core.state.lock().clone();
            match state {
                FutureState::Succeeded(v) => on_result(&v),
                FutureState::Failed(e) => on_failure(&e),
                FutureState::Cancelled => on_failure(&Error::Cancelled),
                FutureState::Pending => {
                    unreachable!("callback listener only fires after completion")
                }
            }
        });
        self.listeners.add_listener(listener, executor);
    }
}
