//! Scheduler capability and adapters.
//!
//! The pacing combinator defers upstream pulls through an external
//! [`Scheduler`]: an execution context that runs submitted tasks serially,
//! in FIFO order, either immediately or after a delay. Serialization by a
//! single queue is what replaces locking for the scheduler-confined relay,
//! so implementations must never run two submitted tasks concurrently.
//!
//! Two adapters are provided: [`TokioScheduler`] drives tasks on a Tokio
//! runtime through a dedicated single-consumer channel, and
//! [`VirtualScheduler`] is a deterministic virtual-time implementation for
//! tests.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use super::error::RelayError;

/// A unit of work submitted to a scheduler.
pub type Task = Box<dyn FnOnce() + Send>;

/// An execution context that serializes submitted tasks.
///
/// `now` is a monotonic reference point measured from the scheduler's own
/// epoch; it only ever moves forward.
pub trait Scheduler: Send + Sync + 'static {
    /// Submits `task` to run as soon as the execution context is free.
    fn schedule(&self, task: Task);

    /// Submits `task` to run once `delay` has elapsed. The task still runs
    /// on the serial execution context, after every task already due.
    fn schedule_after(&self, delay: Duration, task: Task);

    /// Monotonic time elapsed since the scheduler's epoch.
    fn now(&self) -> Duration;
}

/// Scheduler backed by a Tokio runtime.
///
/// All tasks are funneled through an unbounded channel into a single driver
/// task, which executes them one at a time in submission order. Delayed
/// tasks sleep on a Tokio timer first and join the same queue when the
/// timer fires, so they never run concurrently with immediate tasks.
pub struct TokioScheduler {
    sender: tokio::sync::mpsc::UnboundedSender<Task>,
    handle: tokio::runtime::Handle,
    epoch: Instant,
}

impl TokioScheduler {
    /// Creates a scheduler on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`TokioScheduler::try_new`] to handle that case.
    #[must_use]
    pub fn new() -> Self {
        Self::try_new().expect("TokioScheduler requires a running tokio runtime")
    }

    /// Creates a scheduler on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RuntimeUnavailable`] when no runtime is
    /// entered on the current thread.
    pub fn try_new() -> Result<Self, RelayError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RelayError::RuntimeUnavailable)?;
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            debug!("scheduler executor started");
            while let Some(task) = receiver.recv().await {
                task();
            }
            debug!("scheduler executor stopped");
        });

        Ok(Self {
            sender,
            handle,
            epoch: Instant::now(),
        })
    }

    /// Submits `task`, reporting failure when the executor has shut down.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ExecutorUnavailable`] when the driver task is
    /// gone (runtime shutdown).
    pub fn try_schedule(&self, task: Task) -> Result<(), RelayError> {
        self.sender
            .send(task)
            .map_err(|_| RelayError::ExecutorUnavailable)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        if let Err(err) = self.try_schedule(task) {
            error!("dropping scheduled task: {err}");
        }
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let sender = self.sender.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(task).is_err() {
                error!("dropping delayed task: executor is unavailable");
            }
        });
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic virtual-time scheduler for tests.
///
/// Time only moves when [`VirtualScheduler::advance`] is called; tasks due
/// within the advanced window run in (due time, submission order), and
/// tasks they submit are picked up within the same window. Zero-delay work
/// can be drained with [`VirtualScheduler::run_until_idle`].
pub struct VirtualScheduler {
    state: Mutex<VirtualState>,
}

struct VirtualState {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Reverse<TimedTask>>,
}

struct TimedTask {
    due: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for TimedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimedTask {}

impl PartialOrd for TimedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

impl VirtualScheduler {
    /// Creates a scheduler at virtual time zero with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                now: Duration::ZERO,
                next_seq: 0,
                queue: BinaryHeap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tasks waiting in the queue.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.lock().queue.len()
    }

    /// Moves virtual time forward by `by`, running every task that falls
    /// due in the window, including tasks submitted while draining.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        trace!("virtual scheduler advancing to {target:?}");
        loop {
            let due_task = {
                let mut state = self.lock();
                let ready = state
                    .queue
                    .peek()
                    .is_some_and(|Reverse(next)| next.due <= target);
                if ready {
                    state.queue.pop().map(|Reverse(next)| {
                        if state.now < next.due {
                            state.now = next.due;
                        }
                        next.task
                    })
                } else {
                    state.now = target;
                    None
                }
            };
            match due_task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    /// Runs every task already due at the current virtual time, without
    /// moving the clock.
    pub fn run_until_idle(&self) {
        self.advance(Duration::ZERO);
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, task: Task) {
        let mut state = self.lock();
        let entry = TimedTask {
            due: state.now,
            seq: state.next_seq,
            task,
        };
        state.next_seq += 1;
        state.queue.push(Reverse(entry));
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut state = self.lock();
        let entry = TimedTask {
            due: state.now + delay,
            seq: state.next_seq,
            task,
        };
        state.next_seq += 1;
        state.queue.push(Reverse(entry));
    }

    fn now(&self) -> Duration {
        self.lock().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_tasks_run_in_submission_order() {
        let scheduler = VirtualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in 0..4 {
            let log = Arc::clone(&log);
            scheduler.schedule(Box::new(move || log.lock().unwrap().push(label)));
        }
        scheduler.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_delayed_task_waits_for_advance() {
        let scheduler = VirtualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        scheduler.schedule_after(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scheduler.advance(Duration::from_millis(49));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_tasks(), 1);

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_tasks(), 0);
        assert_eq!(scheduler.now(), Duration::from_millis(50));
    }

    #[test]
    fn test_tasks_submitted_while_draining_run_in_window() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_counter = Arc::clone(&fired);
        let chained = Arc::clone(&scheduler);
        scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                let counter = Arc::clone(&inner_counter);
                chained.schedule_after(
                    Duration::from_millis(10),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.advance(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_now_is_monotonic_across_advances() {
        let scheduler = VirtualScheduler::new();
        assert_eq!(scheduler.now(), Duration::ZERO);
        scheduler.advance(Duration::from_millis(5));
        scheduler.advance(Duration::from_millis(7));
        assert_eq!(scheduler.now(), Duration::from_millis(12));
    }
}
