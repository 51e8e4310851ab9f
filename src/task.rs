//! Named worker threads, stop tokens and panic supervision.
//!
//! Every long-lived task runs on its own named thread and observes a
//! [`StopToken`] at each loop head and after every I/O return.  Sleeps go
//! through [`StopToken::wait_timeout`] so a stop request interrupts them
//! immediately.
//!
//! [`spawn_supervised`] wraps a task body in `catch_unwind`: a panicking task
//! is logged and restarted after a back-off, until the token is stopped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info};
use parking_lot::{Condvar, Mutex};

/// Back-off before a panicked task is restarted.
pub const RESTART_BACKOFF: Duration = Duration::from_secs(1);

const STACK_KB: usize = 64;

#[derive(Default)]
struct StopState {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Shared, cloneable stop flag with an interruptible sleep.
#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<StopState>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep up to `timeout`.  Returns `true` as soon as the token is
    /// stopped, `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                return *stopped;
            }
        }
        true
    }

    /// Sleep until `deadline`; same contract as [`wait_timeout`](Self::wait_timeout).
    pub fn wait_until(&self, deadline: Instant) -> bool {
        self.wait_timeout(deadline.saturating_duration_since(Instant::now()))
    }
}

/// Spawn a named thread.
pub fn spawn_named<F>(name: &str, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    info!("Spawning '{name}' (stack={STACK_KB}KB)");
    thread::Builder::new()
        .name(name.to_owned())
        .stack_size(STACK_KB * 1024)
        .spawn(f)
}

/// Spawn a named thread that re-runs `body` after a panic.
///
/// `body` returning normally ends the task.  A panic is logged with the
/// task name and payload, then `body` is run again after `backoff` unless
/// the token has been stopped meanwhile.
pub fn spawn_supervised<F>(
    name: &str,
    stop: StopToken,
    backoff: Duration,
    mut body: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    let task = name.to_owned();
    spawn_named(name, move || {
        loop {
            match panic::catch_unwind(AssertUnwindSafe(&mut body)) {
                Ok(()) => break,
                Err(payload) => {
                    error!(
                        "{task}: panicked ({}), restarting in {} ms",
                        crate::diagnostics::panic_message(payload.as_ref()),
                        backoff.as_millis()
                    );
                }
            }
            if stop.wait_timeout(backoff) {
                break;
            }
            info!("{task}: restarting");
        }
        info!("{task}: exited");
    })
}
