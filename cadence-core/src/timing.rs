//! Clocks and sleeping
//!
//! Scheduling loops never read the wall clock or call `thread::sleep` directly.
//! They go through a [`Clock`], which exposes a monotonic nanosecond timeline and
//! an interruptible "sleep until absolute time" primitive. Production code uses
//! [`MonotonicClock`]; tests substitute [`ManualClock`], a virtual clock whose
//! sleeps complete instantly and are recorded for inspection.

use crate::threading::Shutdown;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Global start time for monotonic nanosecond timestamps
static START: OnceLock<Instant> = OnceLock::new();

/// Sleeps shorter than this are finished with a busy-wait
const SPIN_THRESHOLD_NS: u64 = 200_000;

/// Get current time in nanoseconds since program start
///
/// All timestamps are relative to the first call to this function.
#[inline]
pub fn time_ns() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Busy-wait until the target time is reached
#[inline]
pub fn busy_wait_until(target_ns: u64) {
    while time_ns() < target_ns {
        std::hint::spin_loop();
    }
}

/// Convert a duration to nanoseconds, saturating at `u64::MAX`
#[inline]
pub fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Monotonic time source with an interruptible absolute sleep
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the clock's origin
    fn now_ns(&self) -> u64;

    /// Block until `now_ns() >= deadline_ns`
    ///
    /// Returns early if `shutdown` is triggered. A deadline already in the past
    /// returns immediately.
    ///
    /// # Returns
    /// `true` if the deadline was reached, `false` if interrupted by shutdown
    fn sleep_until(&self, deadline_ns: u64, shutdown: &Shutdown) -> bool;

    /// Relative sleep, anchored at the current time
    fn sleep(&self, duration: Duration, shutdown: &Shutdown) -> bool {
        let deadline = self.now_ns().saturating_add(duration_ns(duration));
        self.sleep_until(deadline, shutdown)
    }
}

/// Real clock backed by [`time_ns`]
///
/// Sleeps park on the shutdown signal's condition variable so that a shutdown
/// wakes them immediately; the last stretch below 200µs is busy-waited.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        time_ns()
    }

    fn sleep_until(&self, deadline_ns: u64, shutdown: &Shutdown) -> bool {
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            let now = time_ns();
            if now >= deadline_ns {
                return true;
            }
            let remaining = deadline_ns - now;
            if remaining <= SPIN_THRESHOLD_NS {
                busy_wait_until(deadline_ns);
                return !shutdown.is_triggered();
            }
            if shutdown.wait_timeout(Duration::from_nanos(remaining - SPIN_THRESHOLD_NS)) {
                return false;
            }
        }
    }
}

/// One sleep observed by a [`ManualClock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepRecord {
    /// Virtual time when the sleep started
    pub from_ns: u64,
    /// Requested deadline
    pub until_ns: u64,
    /// Virtual time after the sleep returned
    pub woke_ns: u64,
}

/// Virtual clock for deterministic tests
///
/// Time only moves through [`ManualClock::advance`] and through sleeps, which
/// jump straight to their deadline. Every sleep is recorded.
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    now_ns: u64,
    sleeps: Vec<SleepRecord>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at `start_ns`
    pub fn starting_at(start_ns: u64) -> Self {
        Self { state: Mutex::new(ManualState { now_ns: start_ns, sleeps: Vec::new() }) }
    }

    /// Move virtual time forward, e.g. to simulate work between wakeups
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.now_ns = state.now_ns.saturating_add(duration_ns(duration));
    }

    /// All sleeps observed so far, oldest first
    pub fn sleeps(&self) -> Vec<SleepRecord> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.lock().now_ns
    }

    fn sleep_until(&self, deadline_ns: u64, shutdown: &Shutdown) -> bool {
        let mut state = self.lock();
        let from_ns = state.now_ns;
        if shutdown.is_triggered() {
            state.sleeps.push(SleepRecord { from_ns, until_ns: deadline_ns, woke_ns: from_ns });
            return false;
        }
        state.now_ns = from_ns.max(deadline_ns);
        let woke_ns = state.now_ns;
        state.sleeps.push(SleepRecord { from_ns, until_ns: deadline_ns, woke_ns });
        true
    }
}
