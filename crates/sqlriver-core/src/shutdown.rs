//! Cooperative cancellation with an interruptible wait

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Cancellation token shared between the host and the poll worker.
///
/// Cloning shares the same flag. [`wait_timeout`](Self::wait_timeout) is the
/// sleep primitive of the poll loop: it returns as soon as shutdown is
/// requested instead of running out the full interval.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("requested", &self.is_requested())
            .finish()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake any waiter.
    ///
    /// Returns `true` only for the call that flipped the flag.
    pub fn request(&self) -> bool {
        let (lock, cond) = &*self.inner;
        let mut requested = lock.lock().expect("shutdown flag poisoned");
        if *requested {
            return false;
        }
        *requested = true;
        cond.notify_all();
        true
    }

    pub fn is_requested(&self) -> bool {
        *self.inner.0.lock().expect("shutdown flag poisoned")
    }

    /// Sleep for `timeout` unless shutdown is requested first.
    ///
    /// Returns `true` if shutdown was requested (before or during the wait).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cond) = &*self.inner;
        let guard = lock.lock().expect("shutdown flag poisoned");
        let (requested, _) = cond
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .expect("shutdown flag poisoned");
        *requested
    }
}
