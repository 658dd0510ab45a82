//! The type-erased task wrapper the scheduler's delay queue actually stores.
//!
//! A [`crate::future::TaskFuture<R>`] is generic over its result type; the scheduler's queue is
//! not (it holds one concrete element type so [`crate::delay_queue::DelayQueue`] need not know
//! about trait objects). `ScheduledTask` closes over a `TaskFuture<R>` behind a boxed closure,
//! erasing `R` to `()` for everything the scheduler itself needs to reason about: whether the run
//! succeeded, and whether to cancel or reschedule it.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::delay_queue::Delayed;
use crate::error::Error;

/// Dispatch priority. `High` tasks are always run before `Low` tasks that are simultaneously
/// ready; see the starvation guard on [`ScheduledTask::delay_millis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Dispatched ahead of any ready `Low` task.
    High,
    /// Dispatched after ready `High` tasks, unless starved past the configured wait bound.
    Low,
}

/// How a recurring task's next ready-time is computed after each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recurrence {
    /// `next_ready = completion_time + period`.
    FixedDelay,
    /// `next_ready = prior_scheduled_ready + period`, independent of run duration (drift-free).
    FixedRate,
}

struct Periodic {
    recurrence: Recurrence,
    period_millis: i64,
    /// The ready-time this run was scheduled for, used by `FixedRate` to compute the next one
    /// without drifting based on how long the run actually took.
    scheduled_ready: AtomicI64,
}

/// A queued unit of work: priority, readiness, and an erased runner.
///
/// Cancellation has exactly one source of truth: the owning future's own state. `is_cancelled`
/// and `cancel_future` both close over the same `Arc<TaskFuture<R>>`, so a caller who cancels the
/// future handle directly (the ordinary path) is observed here too, not just a cancellation routed
/// through [`ScheduledTask::cancel`] itself (the `shutdown_now` path).
pub(crate) struct ScheduledTask {
    ready_time: AtomicI64,
    priority: Priority,
    max_wait_for_low_millis: i64,
    periodic: Option<Periodic>,
    run: Mutex<Box<dyn FnMut() -> Result<(), Error> + Send>>,
    is_cancelled: Box<dyn Fn() -> bool + Send + Sync>,
    cancel_future: Box<dyn Fn() + Send + Sync>,
}

impl ScheduledTask {
    pub(crate) fn one_shot(
        ready_time_millis: i64,
        priority: Priority,
        max_wait_for_low_millis: i64,
        run: Box<dyn FnMut() -> Result<(), Error> + Send>,
        is_cancelled: Box<dyn Fn() -> bool + Send + Sync>,
        cancel_future: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            ready_time: AtomicI64::new(ready_time_millis),
            priority,
            max_wait_for_low_millis,
            periodic: None,
            run,
            is_cancelled,
            cancel_future,
        }
    }

    #[allow(clippy::too_many_arguments, reason = "internal constructor, not part of the public surface")]
    pub(crate) fn recurring(
        ready_time_millis: i64,
        priority: Priority,
        max_wait_for_low_millis: i64,
        recurrence: Recurrence,
        period_millis: i64,
        run: Box<dyn FnMut() -> Result<(), Error> + Send>,
        is_cancelled: Box<dyn Fn() -> bool + Send + Sync>,
        cancel_future: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            ready_time: AtomicI64::new(ready_time_millis),
            priority,
            max_wait_for_low_millis,
            periodic: Some(Periodic {
                recurrence,
                period_millis,
                scheduled_ready: AtomicI64::new(ready_time_millis),
            }),
            run,
            is_cancelled,
            cancel_future,
        }
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        (self.is_cancelled)()
    }

    pub(crate) fn cancel(&self) {
        (self.cancel_future)();
    }

    /// Runs the wrapped body exactly once.
    pub(crate) fn run_once(&self) -> Result<(), Error> {
        (self.run.lock())()
    }

    /// Returns `true` if this task recurs, so the scheduler should consider re-enqueuing it after
    /// a successful run.
    pub(crate) fn is_recurring(&self) -> bool {
        self.periodic.is_some()
    }

    /// Computes and stores this task's next ready-time after a run that completed at
    /// `completion_time_millis`. Only meaningful for recurring tasks.
    pub(crate) fn advance_for_next_run(&self, completion_time_millis: i64) {
        let Some(periodic) = &self.periodic else { return };
        let next = match periodic.recurrence {
            Recurrence::FixedDelay => completion_time_millis + periodic.period_millis,
            Recurrence::FixedRate => {
                periodic.scheduled_ready.load(Ordering::Acquire) + periodic.period_millis
            }
        };
        periodic.scheduled_ready.store(next, Ordering::Release);
        self.ready_time.store(next, Ordering::Release);
    }
}

impl Delayed for ScheduledTask {
    fn delay_millis(&self, now_millis: i64) -> i64 {
        let raw = self.ready_time.load(Ordering::Acquire) - now_millis;
        if raw > 0 {
            return raw;
        }
        let waited = -raw;
        let starved = self.priority == Priority::Low && waited > self.max_wait_for_low_millis;
        if self.priority == Priority::High || starved {
            -2
        } else {
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn no_op_task(ready_time_millis: i64, priority: Priority, max_wait_for_low_millis: i64) -> ScheduledTask {
        ScheduledTask::one_shot(
            ready_time_millis,
            priority,
            max_wait_for_low_millis,
            Box::new(|| Ok(())),
            Box::new(|| false),
            Box::new(|| {}),
        )
    }

    #[test]
    fn not_yet_ready_task_returns_raw_positive_delay() {
        let task = no_op_task(1_000, Priority::Low, 5_000);
        assert_eq!(task.delay_millis(0), 1_000);
    }

    #[test]
    fn ready_high_priority_always_collapses_to_most_urgent_bias() {
        let task = no_op_task(0, Priority::High, 5_000);
        assert_eq!(task.delay_millis(0), -2);
        assert_eq!(task.delay_millis(10_000), -2);
    }

    #[test]
    fn ready_low_priority_uses_lesser_bias_until_starved() {
        let task = no_op_task(0, Priority::Low, 1_000);
        assert_eq!(task.delay_millis(500), -1);
        assert_eq!(task.delay_millis(1_000), -1);
        assert_eq!(task.delay_millis(1_001), -2);
    }

    #[test]
    fn is_cancelled_and_cancel_delegate_to_the_closures_supplied_at_construction() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_flag = Arc::clone(&cancelled);
        let check_flag = Arc::clone(&cancelled);
        let task = ScheduledTask::one_shot(
            0,
            Priority::Low,
            0,
            Box::new(|| Ok(())),
            Box::new(move || check_flag.load(Ordering::Acquire)),
            Box::new(move || cancel_flag.store(true, Ordering::Release)),
        );
        assert!(!task.is_cancelled());
        task.cancel();
        assert!(task.is_cancelled());
    }

    #[test]
    fn fixed_delay_advances_from_completion_time() {
        let task = ScheduledTask::recurring(
            0,
            Priority::Low,
            0,
            Recurrence::FixedDelay,
            100,
            Box::new(|| Ok(())),
            Box::new(|| false),
            Box::new(|| {}),
        );
        task.advance_for_next_run(250);
        assert_eq!(task.delay_millis(250), 100, "not yet ready at the completion instant itself");
        assert_eq!(task.delay_millis(350), -1, "ready once the new scheduled time arrives");
        assert_eq!(task.delay_millis(0), 350);
    }

    #[test]
    fn fixed_rate_advances_from_prior_scheduled_ready_not_completion_time() {
        let task = ScheduledTask::recurring(
            0,
            Priority::Low,
            0,
            Recurrence::FixedRate,
            100,
            Box::new(|| Ok(())),
            Box::new(|| false),
            Box::new(|| {}),
        );
        // Completion took far longer than the period; fixed-rate must not drift off the original
        // schedule by adding the period to the (late) completion time.
        task.advance_for_next_run(10_000);
        assert_eq!(task.delay_millis(0), 100);
    }

    #[test]
    fn one_shot_task_is_not_recurring() {
        let task = no_op_task(0, Priority::Low, 0);
        assert!(!task.is_recurring());
    }

    #[test]
    fn recurring_task_is_recurring() {
        let task = ScheduledTask::recurring(
            0,
            Priority::Low,
            0,
            Recurrence::FixedDelay,
            100,
            Box::new(|| Ok(())),
            Box::new(|| false),
            Box::new(|| {}),
        );
        assert!(task.is_recurring());
    }

    #[test]
    fn run_once_invokes_the_wrapped_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let task = ScheduledTask::one_shot(
            0,
            Priority::Low,
            0,
            Box::new(move || {
                flag.store(true, Ordering::Release);
                Ok(())
            }),
            Box::new(|| false),
            Box::new(|| {}),
        );
        task.run_once().unwrap();
        assert!(ran.load(Ordering::Acquire));
    }
}
