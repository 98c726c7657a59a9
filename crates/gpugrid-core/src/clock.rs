//! Millisecond wall clock, injectable so sweeps and cooldowns can be tested
//! without sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A time source returning milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current wall time in epoch milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Clock backed by [`epoch_ms`].
pub fn system_clock() -> Clock {
    Arc::new(epoch_ms)
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// A [`Clock`] view sharing this clock's time.
    pub fn clock(&self) -> Clock {
        let now = self.now.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_with_its_views() {
        let manual = ManualClock::new(1_000);
        let clock = manual.clock();
        assert_eq!(clock(), 1_000);

        manual.advance(250);
        assert_eq!(clock(), 1_250);

        manual.set(5);
        assert_eq!(clock(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        let clock = system_clock();
        assert!(clock() > 1_577_836_800_000);
    }
}
