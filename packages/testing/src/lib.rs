#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests and examples in the workspace packages.

use std::env;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// How often [`eventually()`] re-evaluates its predicate.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Event tests involve worker threads and timers, so a bug easily turns into a hang instead of
/// a failure. The watchdog converts such hangs into a panic so the test run keeps going.
///
/// The timeout is 10 seconds, or 60 seconds under Miri.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly on the calling thread, so that mutations causing a
/// hang are detected as such.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. A panic in the test itself is propagated.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::Builder::new()
        .name("watched-test".to_owned())
        .spawn(move || {
            // If this fails, the watchdog has already given up on us.
            drop(tx.send(test_fn()));
        })
        .expect("the watchdog must be able to start the test thread");

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle
                .join()
                .expect("test thread already delivered its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the watchdog timeout of {timeout:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread exited without delivering a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Polls `predicate` until it returns `true` or `timeout` elapses.
///
/// Returns whether the predicate was satisfied. Use this to wait for work that happens on a
/// background thread, such as a queued or delayed delivery, without sleeping for a fixed time.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::thread;
/// use std::time::Duration;
///
/// use testing::eventually;
///
/// let done = Arc::new(AtomicBool::new(false));
///
/// let done_clone = Arc::clone(&done);
/// thread::spawn(move || done_clone.store(true, Ordering::Release));
///
/// assert!(eventually(Duration::from_secs(5), || done.load(Ordering::Acquire)));
/// ```
pub fn eventually(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now()
        .checked_add(timeout)
        .expect("timeout must fit in the range of Instant");

    loop {
        if predicate() {
            return true;
        }

        if Instant::now() >= deadline {
            // One last look, in case the work finished while we were checking the clock.
            return predicate();
        }

        thread::sleep(POLL_INTERVAL);
    }
}
