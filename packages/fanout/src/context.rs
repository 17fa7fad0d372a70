//! Execution contexts that asynchronous deliveries are scheduled on.

use std::fmt::Debug;
use std::time::Duration;

/// A unit of work handed to an [`ExecutionContext`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run handlers that are not delivered on the triggering thread.
///
/// The crate ships [`WorkerQueue`][crate::WorkerQueue], a named serial worker thread. Hosts that
/// already have an executor (a thread pool, a UI main loop, an async runtime) can implement this
/// trait to deliver events there instead.
///
/// Implementations must not run the job inline on the calling thread: the caller of
/// [`Event::trigger()`][crate::Event::trigger] relies on asynchronous deliveries never blocking it.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionContext: Debug + Send + Sync + 'static {
    /// Schedules the job to run as soon as possible.
    fn execute(&self, job: Job);

    /// Schedules the job to run no earlier than `delay` from now.
    fn execute_after(&self, delay: Duration, job: Job);
}
