//! A fixed-size worker pool that consumes a [`crate::delay_queue::DelayQueue`] of priority,
//! possibly-recurring tasks.
//!
//! An executor worker loop conventionally alternates between turning its timer wheel and parking
//! until the next tick; here the queue already knows how to sleep until its own head is ready, so
//! the worker loop collapses to "take, run, maybe reschedule" with no separate timer-turning step.

mod scheduled_future;
mod task;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use scheduled_future::ScheduledFuture;
pub use task::{Priority, Recurrence};
use task::ScheduledTask;

use crate::clock::Clock;
use crate::delay_queue::DelayQueue;
use crate::error::{Error, Result};
use crate::future::{ListenableFuture, TaskFuture};

/// Configuration for a [`PriorityScheduler`], supplementing the bare constructor parameters the
/// way a builder supplements a flat constructor.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pool_size: NonZeroUsize,
    default_priority: Priority,
    /// Accepted for interface parity with pooled-executor conventions. This scheduler's pool is
    /// fixed-size for its whole lifetime (elastic sizing is out of scope), so this value is
    /// stored but never consulted by the worker-count logic.
    keep_alive: Option<Duration>,
    max_wait_for_low: Duration,
}

impl SchedulerConfig {
    /// Creates a configuration for a pool of `pool_size` worker threads.
    #[must_use]
    pub fn new(pool_size: NonZeroUsize) -> Self {
        Self {
            pool_size,
            default_priority: Priority::Low,
            keep_alive: None,
            max_wait_for_low: Duration::from_secs(5),
        }
    }

    /// Sets the priority used for submissions that don't specify one.
    #[must_use]
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Sets the idle keep-alive duration (diagnostic only; see field docs).
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Sets the maximum time a `Low` priority task may wait behind ready `High` work before being
    /// treated as `High` itself.
    #[must_use]
    pub fn with_max_wait_for_low(mut self, max_wait_for_low: Duration) -> Self {
        self.max_wait_for_low = max_wait_for_low;
        self
    }
}

/// A worker pool that executes one-shot and recurring tasks in priority and delay order.
pub struct PriorityScheduler {
    queue: Arc<DelayQueue<ScheduledTask>>,
    clock: Clock,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    termination: Arc<(Mutex<()>, Condvar)>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PriorityScheduler {
    /// Starts a new scheduler with `config.pool_size` worker threads running immediately.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let clock = Clock::new();
        let queue: Arc<DelayQueue<ScheduledTask>> = Arc::new(DelayQueue::with_clock(clock.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let active_workers = Arc::new(AtomicUsize::new(config.pool_size.get()));
        let termination = Arc::new((Mutex::new(()), Condvar::new()));

        let mut workers = Vec::with_capacity(config.pool_size.get());
        for id in 0..config.pool_size.get() {
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            let active_workers = Arc::clone(&active_workers);
            let termination = Arc::clone(&termination);
            let handle = std::thread::Builder::new()
                .name(format!("pendulum-worker-{id}"))
                .spawn(move || worker_loop(id, &queue, &shutdown, &active_workers, &termination))
                .expect("failed to spawn scheduler worker thread");
            workers.push(handle);
        }

        Self { queue, clock, config, shutdown, active_workers, termination, workers: Mutex::new(workers) }
    }

    /// Returns the clock this scheduler and its delay queue read "now" from, so callers that
    /// layer their own timing on top (such as [`crate::rate_limiter::RateLimiterExecutor`]) agree
    /// with it on what time it is.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::illegal_state("scheduler has been shut down"));
        }
        Ok(())
    }

    fn enqueue_one_shot<R: Send + Sync + 'static>(
        &self,
        priority: Priority,
        delay: Duration,
        body: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<R>>> {
        self.ensure_accepting()?;
        let future = Arc::new(TaskFuture::one_shot(body));
        let ready_time = self.clock.now_millis() + duration_millis(delay);

        let run_future = Arc::clone(&future);
        let run: Box<dyn FnMut() -> Result<()> + Send> = Box::new(move || run_future.run());
        let cancelled_check = Arc::clone(&future);
        let is_cancelled: Box<dyn Fn() -> bool + Send + Sync> =
            Box::new(move || cancelled_check.is_cancelled());
        let cancel_future = Arc::clone(&future);
        let cancel: Box<dyn Fn() + Send + Sync> = Box::new(move || {
            cancel_future.cancel(true);
        });

        let task = Arc::new(ScheduledTask::one_shot(
            ready_time,
            priority,
            duration_millis(self.config.max_wait_for_low),
            run,
            is_cancelled,
            cancel,
        ));
        self.queue.add(Arc::clone(&task));
        Ok(Arc::new(ScheduledFuture::new(future, task, self.clock.clone())))
    }

    /// Runs `task` with no return value, at the scheduler's default priority, as soon as a worker
    /// is free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<Arc<ScheduledFuture<()>>> {
        self.submit(self.config.default_priority, move || {
            task();
            Ok(())
        })
    }

    /// Submits a fallible task at `priority`, returning a future for its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn submit<R: Send + Sync + 'static>(
        &self,
        priority: Priority,
        task: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<R>>> {
        self.enqueue_one_shot(priority, Duration::ZERO, task)
    }

    /// Submits `task` to run after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn schedule<R: Send + Sync + 'static>(
        &self,
        priority: Priority,
        delay: Duration,
        task: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<R>>> {
        self.enqueue_one_shot(priority, delay, task)
    }

    fn enqueue_recurring(
        &self,
        priority: Priority,
        initial_delay: Duration,
        period: Duration,
        recurrence: Recurrence,
        body: impl FnMut() -> std::result::Result<(), Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<()>>> {
        self.ensure_accepting()?;
        if matches!(recurrence, Recurrence::FixedRate) && period.is_zero() {
            return Err(Error::invalid_argument("scheduleAtFixedRate requires period > 0"));
        }
        let future = Arc::new(TaskFuture::recurring(body));
        let ready_time = self.clock.now_millis() + duration_millis(initial_delay);

        let run_future = Arc::clone(&future);
        let run: Box<dyn FnMut() -> Result<()> + Send> = Box::new(move || run_future.run());
        let cancelled_check = Arc::clone(&future);
        let is_cancelled: Box<dyn Fn() -> bool + Send + Sync> =
            Box::new(move || cancelled_check.is_cancelled());
        let cancel_future = Arc::clone(&future);
        let cancel: Box<dyn Fn() + Send + Sync> = Box::new(move || {
            cancel_future.cancel(true);
        });

        let task = Arc::new(ScheduledTask::recurring(
            ready_time,
            priority,
            duration_millis(self.config.max_wait_for_low),
            recurrence,
            duration_millis(period),
            run,
            is_cancelled,
            cancel,
        ));
        self.queue.add(Arc::clone(&task));
        Ok(Arc::new(ScheduledFuture::new(future, task, self.clock.clone())))
    }

    /// Schedules `task` to run repeatedly, with each run's ready-time computed as
    /// `completion_time + period` (see [`Recurrence::FixedDelay`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn schedule_with_fixed_delay(
        &self,
        priority: Priority,
        initial_delay: Duration,
        period: Duration,
        task: impl FnMut() -> std::result::Result<(), Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<()>>> {
        self.enqueue_recurring(priority, initial_delay, period, Recurrence::FixedDelay, task)
    }

    /// Schedules `task` to run repeatedly at a drift-free cadence (see
    /// [`Recurrence::FixedRate`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `period` is zero, or [`Error::IllegalState`] if the
    /// scheduler has been shut down.
    pub fn schedule_at_fixed_rate(
        &self,
        priority: Priority,
        initial_delay: Duration,
        period: Duration,
        task: impl FnMut() -> std::result::Result<(), Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<()>>> {
        self.enqueue_recurring(priority, initial_delay, period, Recurrence::FixedRate, task)
    }

    /// Submits every task in `tasks`, waits for all to reach a terminal state, and returns their
    /// futures in input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn invoke_all<R: Send + Sync + 'static>(
        &self,
        tasks: Vec<Box<dyn FnOnce() -> std::result::Result<R, Error> + Send>>,
    ) -> Result<Vec<Arc<ScheduledFuture<R>>>> {
        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| self.submit(self.config.default_priority, move || task()))
            .collect::<Result<_>>()?;
        for future in &futures {
            let _ = future.get();
        }
        Ok(futures)
    }

    /// As [`PriorityScheduler::invoke_all`], but cancels any task not yet done after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the scheduler has been shut down.
    pub fn invoke_all_timeout<R: Send + Sync + 'static>(
        &self,
        tasks: Vec<Box<dyn FnOnce() -> std::result::Result<R, Error> + Send>>,
        timeout: Duration,
    ) -> Result<Vec<Arc<ScheduledFuture<R>>>> {
        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| self.submit(self.config.default_priority, move || task()))
            .collect::<Result<_>>()?;
        let deadline = Instant::now() + timeout;
        for future in &futures {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if future.get_timeout(remaining).is_err() {
                future.cancel(true);
            }
        }
        Ok(futures)
    }

    /// Submits every task in `tasks` and returns the first successful result, or the last
    /// failure if every task fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `tasks` is empty, or any error surfaced while
    /// waiting for a result (including the last task's failure if all tasks fail).
    pub fn invoke_any<R: Send + Sync + 'static>(
        &self,
        tasks: Vec<Box<dyn FnOnce() -> std::result::Result<R, Error> + Send>>,
    ) -> Result<Arc<R>> {
        if tasks.is_empty() {
            return Err(Error::invalid_argument("invokeAny requires at least one task"));
        }
        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| self.submit(self.config.default_priority, move || task()))
            .collect::<Result<_>>()?;
        let mut last_err = None;
        for future in &futures {
            match future.get() {
                Ok(value) => {
                    for other in &futures {
                        if !Arc::ptr_eq(other, future) {
                            other.cancel(true);
                        }
                    }
                    return Ok(value);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("non-empty task list always yields at least one result"))
    }

    /// Requests an orderly shutdown: no further submissions are accepted, but queued and
    /// in-flight tasks run to completion. Recurring tasks are not rescheduled once this is
    /// called, so [`PriorityScheduler::await_termination`] is guaranteed to eventually unblock.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        // Workers re-check `shutdown && queue.is_empty()` before every `take()` and close the
        // queue themselves once it drains; closing here too covers the case where the queue is
        // already empty and every worker is parked in an unbounded wait with nothing left to wake
        // them.
        if self.queue.is_empty() {
            self.queue.close();
        }
    }

    /// Requests an immediate shutdown: no further submissions are accepted, the queue is drained,
    /// every drained task's future transitions to `Cancelled`, and any worker parked waiting for
    /// work is released. In-flight task bodies are allowed to finish.
    ///
    /// Returns the drained tasks as opaque handles, since their result types were erased at
    /// submission time.
    pub fn shutdown_now(&self) -> Vec<PendingTask> {
        self.shutdown.store(true, Ordering::Release);
        let drained = self.queue.drain_all();
        self.queue.close();
        drained
            .into_iter()
            .map(|task| {
                task.cancel();
                PendingTask { priority: task.priority() }
            })
            .collect()
    }

    /// Returns `true` once [`PriorityScheduler::shutdown`] or
    /// [`PriorityScheduler::shutdown_now`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Returns `true` once shutdown has been requested and every worker thread has exited.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.active_workers.load(Ordering::Acquire) == 0
    }

    /// Blocks until [`PriorityScheduler::is_terminated`] or `timeout` elapses, returning whether
    /// termination was observed.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.termination;
        let mut guard = lock.lock();
        let deadline = Instant::now() + timeout;
        while !self.is_terminated() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            condvar.wait_for(&mut guard, remaining);
        }
        true
    }
}

impl Drop for PriorityScheduler {
    fn drop(&mut self) {
        if !self.is_shutdown() {
            self.shutdown_now();
        }
        for handle in self.workers.get_mut().drain(..) {
            let _ = handle.join();
        }
    }
}

/// A pending task returned from [`PriorityScheduler::shutdown_now`]: its result type was erased
/// at submission time, so only its scheduling metadata remains observable.
#[derive(Debug, Clone, Copy)]
pub struct PendingTask {
    priority: Priority,
}

impl PendingTask {
    /// The priority this task was queued with.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn scheduler(pool_size: usize) -> PriorityScheduler {
        PriorityScheduler::new(SchedulerConfig::new(NonZeroUsize::new(pool_size).unwrap()))
    }

    #[test]
    fn execute_runs_and_completes() {
        let sched = scheduler(2);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let future = sched.execute(move || flag.store(true, Ordering::Release)).unwrap();
        future.get_timeout(Duration::from_secs(2)).unwrap();
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn submit_propagates_the_body_s_error() {
        let sched = scheduler(1);
        let future = sched.submit(Priority::Low, || Err::<(), _>(Error::invalid_argument("nope"))).unwrap();
        let err = future.get_timeout(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, Error::ExecutionFailure { .. }));
    }

    #[test]
    fn schedule_delays_the_run_by_roughly_the_requested_amount() {
        let sched = scheduler(1);
        let start = sched.clock().now_millis();
        let observed = Arc::new(StdMutex::new(0i64));
        let clock = sched.clock().clone();
        let observed_clone = Arc::clone(&observed);
        let future = sched
            .schedule(Priority::Low, Duration::from_millis(60), move || {
                *observed_clone.lock().unwrap() = clock.now_millis();
                Ok(())
            })
            .unwrap();
        future.get_timeout(Duration::from_secs(2)).unwrap();
        let elapsed = *observed.lock().unwrap() - start;
        assert!(elapsed >= 50, "elapsed={elapsed}");
    }

    #[test]
    fn ready_high_priority_task_runs_before_ready_low_priority_task() {
        let sched = scheduler(1);
        let order = Arc::new(StdMutex::new(Vec::new()));

        // Occupy the pool's only worker so both submissions below are queued up, in whichever
        // order, before either gets a chance to run.
        let gate = sched.execute(|| std::thread::sleep(Duration::from_millis(80))).unwrap();

        let low_order = Arc::clone(&order);
        let low = sched
            .submit(Priority::Low, move || {
                low_order.lock().unwrap().push("low");
                Ok(())
            })
            .unwrap();
        let high_order = Arc::clone(&order);
        let high = sched
            .submit(Priority::High, move || {
                high_order.lock().unwrap().push("high");
                Ok(())
            })
            .unwrap();

        gate.get_timeout(Duration::from_secs(2)).unwrap();
        low.get_timeout(Duration::from_secs(2)).unwrap();
        high.get_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }

    #[test]
    fn cancelling_the_future_directly_prevents_the_task_from_running() {
        let sched = scheduler(1);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let future = sched
            .schedule(Priority::Low, Duration::from_millis(200), move || {
                flag.store(true, Ordering::Release);
                Ok(())
            })
            .unwrap();
        assert!(future.cancel(true));
        std::thread::sleep(Duration::from_millis(300));
        assert!(!ran.load(Ordering::Acquire));
        assert!(future.is_cancelled());
    }

    #[test]
    fn shutdown_lets_queued_work_finish_but_halts_recurrence() {
        let sched = scheduler(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let future = sched
            .schedule_with_fixed_delay(Priority::Low, Duration::ZERO, Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(25));
        sched.shutdown();
        assert!(sched.await_termination(Duration::from_secs(2)));

        let observed = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), observed, "recurrence kept going after shutdown");
        assert!(observed >= 1);
        drop(future);
    }

    #[test]
    fn shutdown_now_drains_and_cancels_queued_tasks() {
        let sched = scheduler(1);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let future = sched
            .schedule(Priority::Low, Duration::from_secs(30), move || {
                flag.store(true, Ordering::Release);
                Ok(())
            })
            .unwrap();

        let pending = sched.shutdown_now();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].priority(), Priority::Low);
        assert!(future.is_cancelled());
        assert!(sched.await_termination(Duration::from_secs(2)));
        assert!(!ran.load(Ordering::Acquire));
    }

    #[test]
    fn fixed_delay_task_quiesces_after_repeated_failure() {
        let sched = scheduler(1);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let _future = sched
            .schedule_with_fixed_delay(Priority::High, Duration::ZERO, Duration::from_millis(5), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 4 {
                    Err(Error::invalid_argument("giving up after 4 runs"))
                } else {
                    Ok(())
                }
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        let observed = runs.load(Ordering::SeqCst);
        assert_eq!(observed, 4, "task kept running after its body failed");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), observed, "failed recurring task was rescheduled anyway");
    }

    #[test]
    fn submissions_after_shutdown_are_rejected() {
        let sched = scheduler(1);
        sched.shutdown();
        assert!(sched.is_shutdown());
        let result = sched.submit(Priority::Low, || Ok(()));
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    #[test]
    fn invoke_all_waits_for_every_task() {
        let sched = scheduler(4);
        let tasks: Vec<Box<dyn FnOnce() -> std::result::Result<i32, Error> + Send>> =
            (0..5).map(|i| Box::new(move || Ok(i)) as Box<dyn FnOnce() -> std::result::Result<i32, Error> + Send>).collect();
        let futures = sched.invoke_all(tasks).unwrap();
        let mut results: Vec<i32> = futures.iter().map(|f| *f.get().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn invoke_any_returns_the_first_success_and_cancels_the_rest() {
        let sched = scheduler(4);
        let tasks: Vec<Box<dyn FnOnce() -> std::result::Result<i32, Error> + Send>> = vec![
            Box::new(|| Ok(1)),
            Box::new(|| Ok(2)),
            Box::new(|| Ok(3)),
        ];
        let result = sched.invoke_any(tasks).unwrap();
        assert!((1..=3).contains(&*result));
    }

    #[test]
    fn invoke_any_rejects_an_empty_task_list() {
        let sched = scheduler(1);
        let tasks: Vec<Box<dyn FnOnce() -> std::result::Result<i32, Error> + Send>> = Vec::new();
        assert!(matches!(sched.invoke_any(tasks), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn schedule_at_fixed_rate_rejects_a_zero_period() {
        let sched = scheduler(1);
        let result = sched.schedule_at_fixed_rate(Priority::Low, Duration::ZERO, Duration::ZERO, || Ok(()));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn fixed_rate_recurrence_stays_on_schedule_across_several_runs() {
        let sched = scheduler(1);
        let fire_times: Arc<StdMutex<Vec<i64>>> = Arc::new(StdMutex::new(Vec::new()));
        let clock = sched.clock().clone();
        let times = Arc::clone(&fire_times);
        let future = sched
            .schedule_at_fixed_rate(Priority::High, Duration::ZERO, Duration::from_millis(20), move || {
                times.lock().unwrap().push(clock.now_millis());
                Ok(())
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(110));
        future.cancel(true);

        let times = fire_times.lock().unwrap();
        assert!(times.len() >= 3, "expected at least 3 runs, got {}", times.len());
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= 10, "runs too close together: gap={gap}");
        }
    }
}

fn worker_loop(
    id: usize,
    queue: &Arc<DelayQueue<ScheduledTask>>,
    shutdown: &Arc<AtomicBool>,
    active_workers: &Arc<AtomicUsize>,
    termination: &Arc<(Mutex<()>, Condvar)>,
) {
    tracing::debug!(worker = id, "scheduler worker starting");
    loop {
        if shutdown.load(Ordering::Acquire) && queue.is_empty() {
            queue.close();
            break;
        }
        match queue.take() {
            Ok(task) => run_and_maybe_reschedule(&task, queue, shutdown),
            Err(Error::Interrupted) => break,
            Err(err) => {
                tracing::error!(worker = id, error = %err, "unexpected error from delay queue take()");
                break;
            }
        }
    }
    tracing::debug!(worker = id, "scheduler worker stopping");
    let remaining = active_workers.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        let (lock, condvar) = &**termination;
        let _guard = lock.lock();
        condvar.notify_all();
    }
}

fn run_and_maybe_reschedule(
    task: &Arc<ScheduledTask>,
    queue: &Arc<DelayQueue<ScheduledTask>>,
    shutdown: &Arc<AtomicBool>,
) {
    if task.is_cancelled() {
        return;
    }
    let result = task.run_once();
    let completion_time = queue.clock().now_millis();

    if !task.is_recurring() {
        return;
    }
    if result.is_err() {
        tracing::warn!("recurring task body failed; recurrence halted");
        return;
    }
    if task.is_cancelled() {
        return;
    }
    if shutdown.load(Ordering::Acquire) {
        tracing::debug!("scheduler shutting down; recurring task will not be rescheduled");
        return;
    }
    task.advance_for_next_run(completion_time);
    queue.add(Arc::clone(task));
}
