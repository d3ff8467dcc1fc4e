//! Cancellation token shared between the source and its controller

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    triggered: Mutex<bool>,
    cond: Condvar,
}

/// Cloneable shutdown flag.
///
/// Blocking waits inside the source (accept polling, reconnect backoff, read
/// timeouts) consult this signal, so triggering it from another thread makes
/// `produce` return within one poll interval.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                triggered: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Request shutdown and wake every waiter
    pub fn trigger(&self) {
        let mut triggered = self.inner.triggered.lock();
        *triggered = true;
        self.inner.cond.notify_all();
    }

    /// Check whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        *self.inner.triggered.lock()
    }

    /// Sleep for up to `timeout`, returning early if shutdown is requested.
    ///
    /// Returns `true` if the signal is triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.inner.triggered.lock();
        while !*triggered {
            if self.inner.cond.wait_until(&mut triggered, deadline).timed_out() {
                break;
            }
        }
        *triggered
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_signal_not_triggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
    }

    #[test]
    fn test_trigger_visible_through_clone() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        clone.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_timeout_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });

        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
