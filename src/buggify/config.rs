//! Per-fault probability configuration

use std::collections::HashMap;

/// Probability of each named fault; unknown sites never fire
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultConfig {
    probabilities: HashMap<&'static str, f64>,
}

impl FaultConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a site's probability, clamped to `[0, 1]`
    pub fn with(mut self, fault_id: &'static str, probability: f64) -> Self {
        self.probabilities
            .insert(fault_id, probability.clamp(0.0, 1.0));
        self
    }

    pub fn get(&self, fault_id: &str) -> f64 {
        self.probabilities.get(fault_id).copied().unwrap_or(0.0)
    }
}
