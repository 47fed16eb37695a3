//! Time sources for freshness checks
//!
//! The cache never reads the system time directly; it asks a [`Clock`]. This
//! lets tests move time forward without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// A source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// Wall-clock time from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to
///
/// Intended for tests and simulations: freshness windows can be crossed by
/// calling [`ManualClock::advance`] instead of waiting.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Moves the clock forward by `ms` milliseconds
    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
