//! State consolidation
//!
//! A device's consolidated state keeps, per metric name, the metric with the
//! greatest producer timestamp seen so far. Each entry behaves like a
//! last-write-wins register: an incoming metric replaces the stored one only
//! when its timestamp is strictly greater, so on a tie the value folded first
//! stays. That tie is the only case where fold order is observable.

use super::types::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest metric per name for one device
///
/// Backed by a `BTreeMap` so equal states serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidatedState {
    entries: BTreeMap<String, Metric>,
}

impl ConsolidatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Metric)> {
        self.entries.iter()
    }

    /// Fold one metric in; returns true if the state changed
    pub fn observe(&mut self, metric: &Metric) -> bool {
        match self.entries.get_mut(&metric.name) {
            Some(stored) => {
                if metric.timestamp > stored.timestamp {
                    *stored = metric.clone();
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.insert(metric.name.clone(), metric.clone());
                true
            }
        }
    }

    /// Pointwise merge; entries already in `self` win ties
    pub fn merge(&mut self, other: &ConsolidatedState) -> bool {
        let mut changed = false;
        for metric in other.entries.values() {
            changed |= self.observe(metric);
        }
        changed
    }

    /// First entry whose key differs from its metric's name
    pub fn misplaced_entry(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, metric)| **name != metric.name)
            .map(|(name, _)| name.as_str())
    }

    /// TigerStyle: Verify all invariants hold
    ///
    /// # Invariants
    /// - Every entry is keyed by its own metric name
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert!(
            self.misplaced_entry().is_none(),
            "Invariant violated: entry keyed by a different name"
        );
    }
}

/// Fold a batch into an existing state
///
/// `None` is treated as the empty state. Visits each incoming metric exactly
/// once, in order.
pub fn fold(existing: Option<ConsolidatedState>, incoming: &[Metric]) -> ConsolidatedState {
    let mut state = existing.unwrap_or_default();
    for metric in incoming {
        state.observe(metric);
    }

    #[cfg(debug_assertions)]
    state.verify_invariants();

    state
}
