//! Cooperative shutdown signal
//!
//! A one-shot flag paired with a condition variable. Loops poll it between
//! steps and clocks block on it while sleeping, so triggering it wakes every
//! sleeper immediately.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Clonable handle to a shared shutdown flag
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake all waiters. Idempotent.
    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *lock(flag) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Block until shutdown is triggered
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let mut triggered = lock(flag);
        while !*triggered {
            triggered = match cvar.wait(triggered) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Block for up to `timeout` or until shutdown is triggered
    ///
    /// A timeout past the range of `Instant` waits without a deadline.
    ///
    /// # Returns
    /// `true` if shutdown has been triggered
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let (flag, cvar) = &*self.inner;
        let mut triggered = lock(flag);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = match cvar.wait_timeout(triggered, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown").field("triggered", &self.is_triggered()).finish()
    }
}

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    match flag.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_shutdown_initially_clear() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(!shutdown.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_trigger_visible_to_clones() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        other.trigger();
        other.trigger();
        assert!(shutdown.is_triggered());
        assert!(shutdown.wait_timeout(Duration::from_secs(10)));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let triggered = waiter.wait_timeout(Duration::from_secs(30));
            (triggered, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();

        let (triggered, elapsed) = handle.join().unwrap();
        assert!(triggered);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_timeout_waits_for_trigger() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let handle = thread::spawn(move || waiter.wait_timeout(Duration::MAX));

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        shutdown.trigger();
        assert!(handle.join().unwrap());
    }
}
