// custody-core/src/clock.rs

use crate::Timestamp;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Port for the time source every accrual reads
///
/// Production uses wall-clock seconds; simulations and tests drive a
/// `ManualClock` so elapsed time is exact.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    fn name(&self) -> &str {
        "Clock"
    }
}

/// Wall-clock time in Unix seconds
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp().max(0) as Timestamp
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }

    /// Move forward by `seconds`, returning the new time
    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
