//! Wall-clock sources for the engine.
//!
//! The engine reads local wall-clock time only through `Clock`, so tests can
//! pin the date while tokio's paused timer drives the countdown.
//!
//! `ManualClock` is only built for tests or with the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
#[cfg(any(test, feature = "test-util"))]
use tokio::time::Instant;

/// Source of local wall-clock time.
pub trait Clock: Send + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[derive(Debug)]
struct ManualState {
    base: NaiveDateTime,
    anchor: Instant,
}

/// A clock that starts at a chosen wall-clock time and then follows tokio time.
///
/// Under `#[tokio::test(start_paused = true)]` the clock moves exactly as far
/// as tokio's auto-advance does, keeping timers and wall clock in step.
/// `advance` and `set` move it independently, which simulates clock jumps.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                base: start,
                anchor: Instant::now(),
            })),
        }
    }

    /// Jumps the wall clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        let mut state = self.lock();
        state.base = now;
        state.anchor = Instant::now();
    }

    /// Moves the wall clock forward without touching tokio time.
    pub fn advance(&self, by: std::time::Duration) {
        let mut state = self.lock();
        if let Ok(delta) = chrono::Duration::from_std(by) {
            state.base += delta;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        let state = self.lock();
        let elapsed = chrono::Duration::from_std(state.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        state.base + elapsed
    }
}
