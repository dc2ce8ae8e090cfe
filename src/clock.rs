//! Clock abstraction
//!
//! Wall-clock milliseconds for record keys and cache expiry. Tests swap in a
//! `SimulatedClock` whose time only moves when told to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Clock trait for time operations
pub trait Clock: Send + Sync + Clone + 'static {
    /// Milliseconds since the UNIX epoch
    fn now_ms(&self) -> u64;

    /// Time elapsed since an earlier reading of this clock
    fn elapsed(&self, since_ms: u64) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(since_ms))
    }
}

/// Real system time, monotonic after construction
#[derive(Clone)]
pub struct ProductionClock {
    start: Instant,
    start_millis: u64,
}

impl Default for ProductionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionClock {
    pub fn new() -> Self {
        // A clock set before 1970 reads as the epoch rather than panicking.
        let start_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        ProductionClock {
            start: Instant::now(),
            start_millis,
        }
    }
}

impl Clock for ProductionClock {
    fn now_ms(&self) -> u64 {
        self.start_millis + self.start.elapsed().as_millis() as u64
    }
}

/// Virtual time; clones share the same counter
#[derive(Clone, Default)]
pub struct SimulatedClock {
    time_ms: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.advance_ms(duration.as_millis() as u64);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, time_ms: u64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_clock_advances() {
        let clock = ProductionClock::new();
        let t1 = clock.now_ms();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now_ms();

        assert!(t2 >= t1 + 10, "Should have elapsed at least 10ms");
    }

    #[test]
    fn test_simulated_clock_deterministic() {
        let clock = SimulatedClock::new(1000);
        assert_eq!(clock.now_ms(), clock.now_ms());

        clock.advance_ms(100);
        assert_eq!(clock.now_ms(), 1100);

        clock.set(5000);
        assert_eq!(clock.now_ms(), 5000);
    }

    #[test]
    fn test_simulated_clock_shared() {
        let clock = SimulatedClock::new(0);
        let clock2 = clock.clone();

        clock.advance(Duration::from_millis(100));
        assert_eq!(clock2.now_ms(), 100, "Clones should share state");
        assert_eq!(clock2.elapsed(40), Duration::from_millis(60));
    }
}
