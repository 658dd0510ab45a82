//! The future handle returned by the scheduler's submit family.
//!
//! Pairs a [`TaskFuture`] with the [`ScheduledTask`] the scheduler actually queued, so the delay
//! until the task's next run stays observable through the handle the caller holds, rather than
//! only through the opaque queue element the scheduler keeps to itself.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::delay_queue::Delayed;
use crate::error::{Error, Result};
use crate::future::{ListenableFuture, TaskFuture};
use crate::listener::{Executor, Listener};

use super::task::{Priority, ScheduledTask};

/// A future for a task submitted to a [`super::PriorityScheduler`], additionally reporting the
/// time remaining until its next run.
pub struct ScheduledFuture<R> {
    task_future: Arc<TaskFuture<R>>,
    scheduled: Arc<ScheduledTask>,
    clock: Clock,
}

impl<R: Send + Sync + 'static> ScheduledFuture<R> {
    pub(super) fn new(task_future: Arc<TaskFuture<R>>, scheduled: Arc<ScheduledTask>, clock: Clock) -> Self {
        Self { task_future, scheduled, clock }
    }

    /// Returns the time remaining until this task is next due to run.
    ///
    /// `Duration::ZERO` once the task is ready, including after a one-shot task has already run
    /// (there is no further run to wait on) or while a recurring task is between runs but already
    /// past its next scheduled time.
    #[must_use]
    pub fn get_delay(&self) -> Duration {
        let millis = self.scheduled.delay_millis(self.clock.now_millis());
        if millis <= 0 {
            Duration::ZERO
        } else {
            #[allow(clippy::cast_sign_loss, reason = "millis was just checked to be positive")]
            Duration::from_millis(millis as u64)
        }
    }

    /// Wraps an already-completed value in a handle with zero delay, for callers that need a
    /// [`ScheduledFuture`] without actually enqueuing work (a rate limiter already under budget).
    pub(crate) fn already_complete(value: R) -> Self {
        let task_future = Arc::new(TaskFuture::one_shot(move || Ok(value)));
        let _ = task_future.run();
        let scheduled = Arc::new(ScheduledTask::one_shot(
            0,
            Priority::Low,
            0,
            Box::new(|| Ok(())),
            Box::new(|| false),
            Box::new(|| {}),
        ));
        Self { task_future, scheduled, clock: Clock::new() }
    }
}

impl<R: Send + Sync + 'static> ListenableFuture<R> for ScheduledFuture<R> {
    fn get(&self) -> Result<Arc<R>> {
        self.task_future.get()
    }

    fn get_timeout(&self, timeout: Duration) -> Result<Arc<R>> {
        self.task_future.get_timeout(timeout)
    }

    fn is_done(&self) -> bool {
        self.task_future.is_done()
    }

    fn is_cancelled(&self) -> bool {
        self.task_future.is_cancelled()
    }

    fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        self.task_future.cancel(may_interrupt_if_running)
    }

    fn add_listener(&self, listener: Arc<Listener>, executor: Option<Arc<dyn Executor>>) {
        self.task_future.add_listener(listener, executor);
    }

    fn add_callback(
        &self,
        on_result: Arc<dyn Fn(&R) + Send + Sync>,
        on_failure: Arc<dyn Fn(&Error) + Send + Sync>,
        executor: Option<Arc<dyn Executor>>,
    ) {
        self.task_future.add_callback(on_result, on_failure, executor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    use crate::scheduler::{PriorityScheduler, SchedulerConfig};

    fn scheduler(pool_size: usize) -> PriorityScheduler {
        PriorityScheduler::new(SchedulerConfig::new(NonZeroUsize::new(pool_size).unwrap()))
    }

    #[test]
    fn get_delay_counts_down_for_a_future_dated_task() {
        let sched = scheduler(1);
        let future = sched.schedule(Priority::Low, Duration::from_millis(200), || Ok(())).unwrap();
        let first = future.get_delay();
        assert!(first > Duration::ZERO, "just-scheduled future-dated task reports zero delay");
        assert!(first <= Duration::from_millis(200));
    }

    #[test]
    fn get_delay_is_zero_once_ready() {
        let sched = scheduler(1);
        let future = sched.submit(Priority::Low, || Ok(())).unwrap();
        assert_eq!(future.get_delay(), Duration::ZERO);
    }

    #[test]
    fn already_complete_reports_zero_delay_and_a_done_future() {
        let future = ScheduledFuture::already_complete(7);
        assert_eq!(future.get_delay(), Duration::ZERO);
        assert!(future.is_done());
        assert_eq!(*future.get().unwrap(), 7);
    }
}
