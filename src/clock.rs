//! Injectable time source.
//!
//! The reconciliation engine never calls `SystemTime::now()` directly; every component that
//! needs "now" carries a [`Clock`] so tests can drive time deterministically instead of racing
//! a real clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now", expressed as epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs_f64()
    }
}

/// A manually-advanced clock for tests.
///
/// Stores time as milliseconds internally so it can be shared and mutated through an
/// [`Arc`] without a lock.
#[derive(Debug, Clone)]
pub struct TestClock {
    millis: Arc<AtomicI64>,
}

impl TestClock {
    pub fn new(start: f64) -> Self {
        TestClock {
            millis: Arc::new(AtomicI64::new((start * 1000.0) as i64)),
        }
    }

    pub fn set(&self, t: f64) {
        self.millis.store((t * 1000.0) as i64, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.millis
            .fetch_add((secs * 1000.0) as i64, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

/// A shared, cloneable handle to any [`Clock`] implementation.
pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
