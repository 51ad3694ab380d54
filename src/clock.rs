//! Monotonic time sources for performance measurement

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Process-wide origin for [`SystemClock`] readings
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A monotonic time source.
///
/// Readings are durations since an arbitrary fixed origin, so only the
/// difference between two readings of the same clock is meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// High resolution clock backed by [`Instant`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        EPOCH.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
