//! BUGGIFY - FoundationDB-Style Fault Injection
//!
//! Every operation of a simulated backend is a named fault site. A
//! [`FaultInjector`] owns the seeded RNG, the per-site probabilities and the
//! per-site counters, so two injectors built from the same seed and config
//! fire the same faults in the same places.
//!
//! ```ignore
//! if buggify!(injector, faults::object_store::PUT_FAIL) {
//!     return Err(simulated_failure());
//! }
//! ```

pub mod config;
pub mod faults;

pub use config::FaultConfig;

use crate::io::Rng;
use std::collections::BTreeMap;

/// How often each fault site was checked and how often it fired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultStats {
    checks: BTreeMap<&'static str, u64>,
    triggers: BTreeMap<&'static str, u64>,
}

impl FaultStats {
    pub fn checks(&self, fault_id: &str) -> u64 {
        self.checks.get(fault_id).copied().unwrap_or(0)
    }

    pub fn triggers(&self, fault_id: &str) -> u64 {
        self.triggers.get(fault_id).copied().unwrap_or(0)
    }

    pub fn total_triggers(&self) -> u64 {
        self.triggers.values().sum()
    }

    pub fn trigger_rate(&self, fault_id: &str) -> f64 {
        match self.checks(fault_id) {
            0 => 0.0,
            checks => self.triggers(fault_id) as f64 / checks as f64,
        }
    }

    /// One line per checked site: `site: fired/checked`
    pub fn summary(&self) -> String {
        self.checks
            .iter()
            .map(|(fault_id, checks)| format!("{}: {}/{}", fault_id, self.triggers(fault_id), checks))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Seeded fault decisions for one simulated component
#[derive(Debug)]
pub struct FaultInjector<R: Rng> {
    rng: R,
    config: FaultConfig,
    stats: FaultStats,
}

impl<R: Rng> FaultInjector<R> {
    pub fn new(rng: R, config: FaultConfig) -> Self {
        FaultInjector {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    /// Roll the dice for a fault site
    ///
    /// Sites with probability zero are counted but consume no randomness,
    /// so enabling one fault does not shift the decisions of the others.
    pub fn should_fail(&mut self, fault_id: &'static str) -> bool {
        *self.stats.checks.entry(fault_id).or_insert(0) += 1;

        let probability = self.config.get(fault_id);
        if probability <= 0.0 {
            return false;
        }

        let triggered = self.rng.gen_range(0, 1_000_000) as f64 / 1_000_000.0 < probability;
        if triggered {
            *self.stats.triggers.entry(fault_id).or_insert(0) += 1;
        }
        triggered
    }

    /// Uniform draw in `[min, max)` from the same stream, e.g. for latency
    pub fn draw(&mut self, min: u64, max: u64) -> u64 {
        self.rng.gen_range(min, max)
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn stats(&self) -> &FaultStats {
        &self.stats
    }
}

/// BUGGIFY macro - the main interface for fault injection
#[macro_export]
macro_rules! buggify {
    ($injector:expr, $fault_id:expr) => {
        $injector.should_fail($fault_id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SimulatedRng;
    use faults::object_store::{GET_FAIL, PUT_FAIL};

    #[test]
    fn test_certain_and_impossible_faults() {
        let config = FaultConfig::new().with(PUT_FAIL, 1.0);
        let mut injector = FaultInjector::new(SimulatedRng::new(1), config);

        for _ in 0..100 {
            assert!(buggify!(injector, PUT_FAIL));
            assert!(!buggify!(injector, GET_FAIL));
        }

        let stats = injector.stats();
        assert_eq!(stats.checks(PUT_FAIL), 100);
        assert_eq!(stats.triggers(PUT_FAIL), 100);
        assert_eq!(stats.triggers(GET_FAIL), 0);
        assert_eq!(stats.trigger_rate(GET_FAIL), 0.0);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let config = FaultConfig::new().with(PUT_FAIL, 0.3);
        let mut a = FaultInjector::new(SimulatedRng::new(2024), config.clone());
        let mut b = FaultInjector::new(SimulatedRng::new(2024), config);

        let fired_a: Vec<bool> = (0..200).map(|_| buggify!(a, PUT_FAIL)).collect();
        let fired_b: Vec<bool> = (0..200).map(|_| buggify!(b, PUT_FAIL)).collect();
        assert_eq!(fired_a, fired_b);

        let rate = a.stats().trigger_rate(PUT_FAIL);
        assert!(rate > 0.15 && rate < 0.45, "rate: {}", rate);
    }

    #[test]
    fn test_zero_probability_sites_do_not_consume_randomness() {
        let config = FaultConfig::new().with(PUT_FAIL, 0.5);
        let mut plain = FaultInjector::new(SimulatedRng::new(9), config.clone());
        let mut interleaved = FaultInjector::new(SimulatedRng::new(9), config);

        let expected: Vec<bool> = (0..50).map(|_| buggify!(plain, PUT_FAIL)).collect();
        let actual: Vec<bool> = (0..50)
            .map(|_| {
                let _ = buggify!(interleaved, GET_FAIL);
                buggify!(interleaved, PUT_FAIL)
            })
            .collect();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_summary_lists_checked_sites() {
        let mut injector =
            FaultInjector::new(SimulatedRng::new(3), FaultConfig::new().with(GET_FAIL, 1.0));
        let _ = buggify!(injector, GET_FAIL);

        assert_eq!(injector.stats().summary(), format!("{}: 1/1", GET_FAIL));
        assert_eq!(injector.stats().total_triggers(), 1);
    }
}
