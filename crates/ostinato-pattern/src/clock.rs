//! Injectable clocks and cooperative play control.
//!
//! The scheduler only ever suspends inside [`Clock::sleep`], so pause and
//! cancellation are handled there: pausing blocks without consuming
//! musical time, cancelling aborts the sleep immediately. Tests inject
//! [`ImmediateClock`] and run whole patterns in zero wall-clock time;
//! offline rendering injects [`OfflineClock`], advanced once per rendered
//! block.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How a sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Cancelled,
}

/// Shared pause/cancel state for one scheduler task.
#[derive(Debug, Default)]
pub struct PlayControl {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    cond: Condvar,
}

impl PlayControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation and wake any sleeper.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    pub fn set_paused(&self, paused: bool) {
        *self.paused.lock() = paused;
        self.cond.notify_all();
    }

    /// Block while paused. Returns `Cancelled` if cancellation arrives
    /// while waiting.
    fn wait_while_paused(&self) -> Wake {
        let mut paused = self.paused.lock();
        while *paused {
            if self.is_cancelled() {
                return Wake::Cancelled;
            }
            self.cond.wait_for(&mut paused, Duration::from_millis(50));
        }
        Wake::Elapsed
    }

    /// Timed wait on the control condvar; wakes early on cancel/pause
    /// notifications.
    fn wait_timeout(&self, timeout: Duration) {
        let mut guard = self.paused.lock();
        self.cond.wait_for(&mut guard, timeout);
    }
}

/// A source of musical time plus a cancellable, pausable sleep.
pub trait Clock: Send + Sync {
    /// Seconds elapsed on this clock.
    fn now(&self) -> f64;

    /// Suspend for `seconds` of clock time. Pause stops the countdown;
    /// cancellation aborts it.
    fn sleep(&self, seconds: f64, ctl: &PlayControl) -> Wake;
}

/// Wall-clock time anchored at construction.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64, ctl: &PlayControl) -> Wake {
        let mut remaining = seconds.max(0.0);
        loop {
            if ctl.is_cancelled() {
                return Wake::Cancelled;
            }
            if ctl.is_paused() {
                if ctl.wait_while_paused() == Wake::Cancelled {
                    return Wake::Cancelled;
                }
                continue;
            }
            if remaining <= 0.0 {
                return Wake::Elapsed;
            }
            let slice = remaining.min(0.25);
            let before = Instant::now();
            ctl.wait_timeout(Duration::from_secs_f64(slice));
            remaining -= before.elapsed().as_secs_f64();
        }
    }
}

/// Virtual time driven by the offline render loop.
///
/// Sleepers wake when `advance` pushes the clock past their deadline, so
/// pattern events line up with rendered time rather than wall time.
#[derive(Debug, Default)]
pub struct OfflineClock {
    t: Mutex<f64>,
    cond: Condvar,
}

impl OfflineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `seconds` of rendered audio.
    pub fn advance(&self, seconds: f64) {
        *self.t.lock() += seconds;
        self.cond.notify_all();
    }
}

impl Clock for OfflineClock {
    fn now(&self) -> f64 {
        *self.t.lock()
    }

    fn sleep(&self, seconds: f64, ctl: &PlayControl) -> Wake {
        let deadline = self.now() + seconds.max(0.0);
        loop {
            if ctl.is_cancelled() {
                return Wake::Cancelled;
            }
            if ctl.is_paused() {
                if ctl.wait_while_paused() == Wake::Cancelled {
                    return Wake::Cancelled;
                }
                continue;
            }
            let mut t = self.t.lock();
            if *t >= deadline {
                return Wake::Elapsed;
            }
            // Bounded wait so a cancel that races the last advance is
            // still observed promptly.
            self.cond.wait_for(&mut t, Duration::from_millis(10));
        }
    }
}

/// Returns from every sleep immediately, advancing virtual time by the
/// requested amount. Lets tests drive whole patterns in zero wall-clock
/// time while keeping event ordering observable through `now`.
#[derive(Debug, Default)]
pub struct ImmediateClock {
    t: Mutex<f64>,
}

impl ImmediateClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for ImmediateClock {
    fn now(&self) -> f64 {
        *self.t.lock()
    }

    fn sleep(&self, seconds: f64, ctl: &PlayControl) -> Wake {
        if ctl.is_cancelled() {
            return Wake::Cancelled;
        }
        *self.t.lock() += seconds.max(0.0);
        Wake::Elapsed
    }
}
