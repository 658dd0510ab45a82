//! A future whose payload is the runnable/callable it will execute.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::listener::{Executor, Listener};

use super::core::FutureCore;
use super::ListenableFuture;

type Body<R> = dyn FnMut() -> std::result::Result<R, Error> + Send;

/// A future that owns and runs a task body.
///
/// Built either [`TaskFuture::one_shot`] (runs once, then is terminal forever) or
/// [`TaskFuture::recurring`] (runs repeatedly; after each successful run it resets to `Pending`
/// until the scheduler drives the next run). A recurring run that fails leaves the future
/// permanently `Failed`; the scheduler reads this to decide whether to keep re-enqueuing it.
///
/// Because a recurring future revisits `Pending` between runs, a call to [`TaskFuture::get`] can
/// race the next cycle: it is only guaranteed to observe *some* terminal state it happened to
/// catch while still terminal, not every individual run's result.
pub struct TaskFuture<R> {
    core: Arc<FutureCore<R>>,
    body: Mutex<Box<Body<R>>>,
    recurring: bool,
}

impl<R: Send + Sync + 'static> TaskFuture<R> {
    /// Wraps a body that runs exactly once.
    pub fn one_shot(body: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static) -> Self {
        let mut body = Some(body);
        Self {
            core: Arc::new(FutureCore::new()),
            body: Mutex::new(Box::new(move || {
                (body.take().expect("one-shot task body runs at most once"))()
            })),
            recurring: false,
        }
    }

    /// Wraps a body that may run any number of times.
    pub fn recurring(body: impl FnMut() -> std::result::Result<R, Error> + Send + 'static) -> Self {
        Self { core: Arc::new(FutureCore::with_mode(false)), body: Mutex::new(Box::new(body)), recurring: true }
    }

    /// Returns `true` if this future resets to `Pending` after a successful run instead of
    /// staying terminal.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.recurring
    }

    /// Runs the task body exactly once, catching panics, and drives the owning future's terminal
    /// transition (see [`FutureCore::run_cycle`]).
    ///
    /// Returns `Ok(())` if the body completed without error or panic, `Err` otherwise -- the
    /// scheduler uses this to decide whether a recurring task's recurrence continues.
    ///
    /// # Panics
    ///
    /// Never panics: a panicking body is caught and converted to [`Error::ExecutionFailure`].
    pub(crate) fn run(&self) -> std::result::Result<(), Error> {
        let outcome: std::result::Result<R, Error> = {
            let mut body = self.body.lock();
            match catch_unwind(AssertUnwindSafe(|| (body)())) {
                Ok(result) => result,
                Err(payload) => Err(Error::from_panic(payload)),
            }
        };
        let for_caller = match &outcome {
            Ok(_) => Ok(()),
            Err(e) => Err(clone_error(e)),
        };
        self.core.run_cycle(outcome, self.recurring);
        for_caller
    }
}

fn clone_error(err: &Error) -> Error {
    Error::ExecutionFailure { cause: err.to_string() }
}

impl<R: Send + Sync + 'static> ListenableFuture<R> for TaskFuture<R> {
    fn get(&self) -> Result<Arc<R>> {
        self.core.get()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<Arc<R>> {
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
        on_result: Arc<dyn Fn(&R) + Send + Sync>,
        on_failure: Arc<dyn Fn(&Error) + Send + Sync>,
        executor: Option<Arc<dyn Executor>>,
    ) {
        self.core.add_callback(on_result, on_failure, executor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn one_shot_runs_once_and_completes() {
        let task: TaskFuture<i32> = TaskFuture::one_shot(|| Ok(5));
        assert!(task.run().is_ok());
        assert_eq!(*task.get().unwrap(), 5);
        assert!(task.is_done());
    }

    #[test]
    fn one_shot_panic_becomes_execution_failure() {
        let task: TaskFuture<i32> = TaskFuture::one_shot(|| panic!("boom"));
        assert!(task.run().is_err());
        let err = task.get().unwrap_err();
        assert!(matches!(err, Error::ExecutionFailure { .. }));
    }

    #[test]
    fn recurring_task_resets_to_pending_after_success() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = Arc::clone(&runs);
        let task: TaskFuture<()> = TaskFuture::recurring(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(task.run().is_ok());
        assert!(!task.is_done(), "recurring future resets to pending after a successful run");
        assert!(task.run().is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recurring_task_halts_and_stays_failed_after_error() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = Arc::clone(&runs);
        let task: TaskFuture<()> = TaskFuture::recurring(move || {
            let n = runs_clone.fetch_add(1, Ordering::SeqCst);
            if n >= 3 {
                Err(Error::illegal_state("simulated failure"))
            } else {
                Ok(())
            }
        });

        for _ in 0..4 {
            let _ = task.run();
        }
        assert!(task.is_done());
        assert!(task.get().is_err());
    }

    #[test]
    fn listeners_fire_on_every_recurring_cycle() {
        let fired = Arc::new(AtomicUsize::new(0));
        let task: TaskFuture<()> = TaskFuture::recurring(|| Ok(()));
        let fired_clone = Arc::clone(&fired);
        task.add_listener(Arc::new(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }), None);

        task.run().unwrap();
        task.run().unwrap();
        task.run().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }
}
