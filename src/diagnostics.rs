//! Crash logging and runtime diagnostics.
//!
//! The panic hook logs the panicking thread, location and payload through
//! the `log` facade before unwinding reaches the task supervisor, and counts
//! panics for the periodic status line.

use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};

static PANIC_COUNT: AtomicU64 = AtomicU64::new(0);

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Panics observed since startup.
pub fn panic_count() -> u64 {
    PANIC_COUNT.load(Ordering::Relaxed)
}

// ───────────────────────────────────────────────────────────────
// Custom panic handler
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that logs the crash.
///
/// Call once during init, after the logger.  The hook does not abort;
/// the unwinding thread is caught by its supervisor.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        PANIC_COUNT.fetch_add(1, Ordering::Relaxed);
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        log::error!("PANIC in '{name}' at {location}: {}", panic_message(info.payload()));
    }));
}

/// Runtime snapshot for the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub events_dropped: u64,
    pub panics: u64,
    pub running_tasks: usize,
}

impl core::fmt::Display for RuntimeMetrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "up {}s, {} tasks, {} events dropped, {} panics",
            self.uptime_secs, self.running_tasks, self.events_dropped, self.panics
        )
    }
}
