//! Randomness abstraction shared by production code and deterministic tests.
//!
//! Fault injection (`buggify`) and the simulated object store draw every
//! decision from an [`Rng`], so a test seeded with [`SimulatedRng`] replays
//! the exact same fault sequence on every run.

pub mod production;
pub mod simulation;

pub use production::ProductionRng;
pub use simulation::SimulatedRng;

/// Source of randomness used at fault-injection decision points
pub trait Rng: Send {
    fn next_u64(&mut self) -> u64;

    fn gen_bool(&mut self, probability: f64) -> bool;

    /// Uniform value in `[min, max)`; returns `min` when the range is empty
    fn gen_range(&mut self, min: u64, max: u64) -> u64;

    fn shuffle<T>(&mut self, slice: &mut [T]);
}
