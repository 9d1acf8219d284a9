//! Counting semaphore bounding in-flight bulk submissions.
//!
//! `Mutex + Condvar` from std. Permits are owned (`Arc`-backed) so they can
//! travel into the task that completes the submission and release on drop.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Limits how many submissions may be outstanding at once.
///
/// [`overdraw`](Self::overdraw) hands out a permit past capacity; the
/// in-use count then exceeds capacity until enough permits are dropped.
pub struct Semaphore {
    in_use: Mutex<usize>,
    cond: Condvar,
    capacity: usize,
}

/// RAII permit that releases one unit on drop.
pub struct Permit(Arc<Semaphore>);

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

impl Semaphore {
    /// Create a semaphore with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            in_use: Mutex::new(0),
            cond: Condvar::new(),
            capacity: capacity.max(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held, including overdrawn ones
    pub fn in_use(&self) -> usize {
        *self.in_use.lock().expect("semaphore poisoned")
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let guard = self.in_use.lock().expect("semaphore poisoned");
        let mut count = self
            .cond
            .wait_while(guard, |n| *n >= self.capacity)
            .expect("semaphore poisoned");
        *count += 1;
        Permit(Arc::clone(self))
    }

    /// Wait up to `timeout` for a permit. `None` if none freed up in time.
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let guard = self.in_use.lock().expect("semaphore poisoned");
        let (mut count, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |n| *n >= self.capacity)
            .expect("semaphore poisoned");
        if *count >= self.capacity {
            return None;
        }
        *count += 1;
        Some(Permit(Arc::clone(self)))
    }

    /// Take a permit regardless of capacity.
    pub fn overdraw(self: &Arc<Self>) -> Permit {
        *self.in_use.lock().expect("semaphore poisoned") += 1;
        Permit(Arc::clone(self))
    }

    /// Wait until every permit has been returned. `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.in_use.lock().expect("semaphore poisoned");
        let (count, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |n| *n > 0)
            .expect("semaphore poisoned");
        *count == 0
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut count = self.0.in_use.lock().expect("semaphore poisoned");
        *count -= 1;
        // acquirers and idle-waiters share the condvar
        self.0.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn acquire_and_release() {
        let sem = Semaphore::new(2);
        let g1 = sem.acquire();
        let _g2 = sem.acquire();
        assert_eq!(sem.in_use(), 2);
        drop(g1);
        assert_eq!(sem.in_use(), 1);
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let sem = Semaphore::new(0);
        assert_eq!(sem.capacity(), 1);
        let _g = sem.acquire();
        assert!(sem.acquire_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn blocking_acquire() {
        let sem = Semaphore::new(1);
        let guard = sem.acquire();

        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            let _g = sem2.acquire();
            42
        });

        // Give thread time to block
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn acquire_timeout_expires_when_full() {
        let sem = Semaphore::new(1);
        let _g = sem.acquire();
        let start = Instant::now();
        assert!(sem.acquire_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn acquire_timeout_succeeds_when_released() {
        let sem = Semaphore::new(1);
        let guard = sem.acquire();
        let sem2 = sem.clone();
        let handle =
            std::thread::spawn(move || sem2.acquire_timeout(Duration::from_secs(5)).is_some());
        std::thread::sleep(Duration::from_millis(30));
        drop(guard);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn overdraw_exceeds_capacity() {
        let sem = Semaphore::new(1);
        let _a = sem.acquire();
        let b = sem.overdraw();
        assert_eq!(sem.in_use(), 2);
        drop(b);
        assert_eq!(sem.in_use(), 1);
        // still full at capacity 1
        assert!(sem.acquire_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn wait_idle_after_all_released() {
        let sem = Semaphore::new(3);
        let permits: Vec<_> = (0..3).map(|_| sem.acquire()).collect();
        assert!(!sem.wait_idle(Duration::from_millis(10)));
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            drop(permits);
        });
        assert!(sem.wait_idle(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn permit_released_from_another_thread() {
        let sem = Semaphore::new(1);
        let permit = sem.acquire();
        std::thread::spawn(move || drop(permit)).join().unwrap();
        assert_eq!(sem.in_use(), 0);
    }
}
