//! A named serial worker thread that implements [`ExecutionContext`].

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use crate::{ExecutionContext, Job, SpawnError};

const DEFAULT_NAME: &str = "fanout-worker";

/// A job waiting for its due time.
struct Timer {
    // `None` when the delay does not fit in an `Instant`. Such a timer is never due.
    due: Option<Instant>,

    // Tie-breaker that keeps jobs with the same due time in scheduling order.
    seq: u64,

    job: Job,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so that the max-heap yields the earliest due time first.
    fn cmp(&self, other: &Self) -> Ordering {
        due_order(other.due, self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

// Orders due times with "never" after every real instant.
fn due_order(a: Option<Instant>, b: Option<Instant>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Job>,
    timers: BinaryHeap<Timer>,
    next_timer_seq: u64,
    shutdown: bool,
}

impl QueueState {
    /// Moves every timer that is due by `now` to the back of the ready queue.
    fn promote_due(&mut self, now: Instant) {
        while self
            .timers
            .peek()
            .is_some_and(|timer| timer.due.is_some_and(|due| due <= now))
        {
            if let Some(timer) = self.timers.pop() {
                self.ready.push_back(timer.job);
            }
        }
    }
}

struct WorkerCore {
    name: Cow<'static, str>,
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl WorkerCore {
    fn push_ready(&self, job: Job) {
        self.state.lock().ready.push_back(job);
        self.wake.notify_one();
    }

    fn push_timer(&self, delay: Duration, job: Job) {
        let due = Instant::now().checked_add(delay);

        if due.is_none() {
            debug!(worker = %self.name, ?delay, "delay out of range, job will never become due");
        }

        {
            let mut state = self.state.lock();
            let seq = state.next_timer_seq;
            state.next_timer_seq = seq.wrapping_add(1);
            state.timers.push(Timer {
                due,
                seq,
                job,
            });
        }

        // The new timer may be due earlier than whatever the worker is sleeping towards.
        self.wake.notify_one();
    }

    fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock();

        loop {
            if state.shutdown {
                let abandoned = state.ready.len() + state.timers.len();

                if abandoned > 0 {
                    warn!(worker = %self.name, abandoned, "worker shutting down with pending jobs");
                }

                return None;
            }

            state.promote_due(Instant::now());

            if let Some(job) = state.ready.pop_front() {
                return Some(job);
            }

            match state.timers.peek().and_then(|timer| timer.due) {
                Some(due) => {
                    self.wake.wait_until(&mut state, due);
                }
                None => self.wake.wait(&mut state),
            }
        }
    }

    fn run(&self) {
        debug!(worker = %self.name, "worker thread started");

        while let Some(job) = self.next_job() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!(
                    worker = %self.name,
                    panic = panic_message(payload.as_ref()),
                    "job panicked on worker thread"
                );
            }
        }

        debug!(worker = %self.name, "worker thread exiting");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Owns the worker thread. Dropped when the last [`WorkerQueue`] clone goes away.
struct WorkerThread {
    core: Arc<WorkerCore>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.core.state.lock().shutdown = true;
        self.core.wake.notify_all();

        // The last handle may be released by a job running on the worker itself,
        // in which case the thread exits on its own once that job returns.
        if thread::current().id() == self.thread_id {
            return;
        }

        if let Some(handle) = self.handle.lock().take() {
            if let Err(payload) = handle.join() {
                // Jobs run inside a panic trap, so this means the queue machinery itself failed.
                panic::resume_unwind(payload);
            }
        }
    }
}

/// A named serial worker thread for queued and delayed event deliveries.
///
/// Jobs run one at a time in the order they became runnable: immediately scheduled jobs in
/// submission order, delayed jobs once their delay has elapsed.
///
/// The queue is cheaply cloneable; all clones feed the same thread. When the last clone is
/// dropped, the worker finishes the job it is currently running and exits. Jobs that have not
/// started by then are abandoned.
///
/// A job that panics is logged and discarded; the worker keeps serving subsequent jobs.
///
/// # Example
///
/// ```rust
/// use fanout::{Delivery, Event, Owner, SubscribeOptions, WorkerQueue};
///
/// let queue = WorkerQueue::new("ui-updates");
/// let event = Event::<u32>::new();
/// let owner = Owner::new();
///
/// event.subscribe_with(
///     &owner,
///     SubscribeOptions::new().delivery(Delivery::queued(queue.clone())),
///     |value| println!("on the worker: {value}"),
/// );
///
/// event.trigger(1);
///
/// // Wait for the delivery to happen.
/// queue.flush();
/// ```
#[derive(Clone)]
pub struct WorkerQueue {
    thread: Arc<WorkerThread>,
}

impl WorkerQueue {
    /// Starts a new worker thread with the given name.
    ///
    /// Use [`WorkerQueue::builder()`] to handle thread spawning failures.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to start the thread.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::builder()
            .name(name)
            .build()
            .expect("failed to spawn worker thread: thread spawning failure is not supported")
    }

    /// Creates a builder for configuring the worker.
    #[must_use]
    pub fn builder() -> WorkerQueueBuilder {
        WorkerQueueBuilder::new()
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.thread.core.name
    }

    /// Number of jobs that have been scheduled but have not started yet, delayed ones included.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.thread.core.state.lock();
        state.ready.len() + state.timers.len()
    }

    /// Blocks until every job that was runnable before this call has finished.
    ///
    /// Delayed jobs that are not yet due are not waited for. Calling this from a job running on
    /// the same worker returns immediately.
    pub fn flush(&self) {
        if thread::current().id() == self.thread.thread_id {
            return;
        }

        let (sender, receiver) = oneshot::channel::<()>();

        self.thread.core.push_ready(Box::new(move || {
            // The flushing thread may have been interrupted by a panic; nothing to tell it then.
            drop(sender.send(()));
        }));

        // The worker only drops the sender without sending if it shuts down first,
        // which cannot happen while we hold a handle to it.
        drop(receiver.recv());
    }
}

impl ExecutionContext for WorkerQueue {
    fn execute(&self, job: Job) {
        trace!(worker = %self.name(), "job queued");
        self.thread.core.push_ready(job);
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        trace!(worker = %self.name(), ?delay, "job scheduled");
        self.thread.core.push_timer(delay, job);
    }
}

impl fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`WorkerQueue`].
#[derive(Debug)]
pub struct WorkerQueueBuilder {
    name: Cow<'static, str>,
}

impl WorkerQueueBuilder {
    fn new() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_NAME),
        }
    }

    /// Sets the name of the worker thread.
    ///
    /// Default is `fanout-worker`.
    #[must_use]
    pub fn name(self, name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }

    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the operating system refuses to start the thread.
    pub fn build(self) -> Result<WorkerQueue, SpawnError> {
        let core = Arc::new(WorkerCore {
            name: self.name,
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
        });

        let worker_core = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name(core.name.to_string())
            .spawn(move || worker_core.run())
            .map_err(|source| SpawnError::new(core.name.clone(), source))?;

        Ok(WorkerQueue {
            thread: Arc::new(WorkerThread {
                thread_id: handle.thread().id(),
                handle: Mutex::new(Some(handle)),
                core,
            }),
        })
    }
}
