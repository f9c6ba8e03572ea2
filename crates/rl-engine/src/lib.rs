//! Bandit decision engine that learns online which arm of a menu offer test
//! performs best. Epsilon-greedy and Thompson sampling selection, Gamma/Beta
//! samplers, and Wilson score confidence bounds for reporting.

pub mod bandits;
pub mod random;
pub mod sampling;
pub mod strategy;
pub mod wilson;

pub use bandits::BanditEngine;
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use strategy::{EpsilonGreedy, SelectionStrategy, ThompsonSampling};
pub use wilson::{wilson_interval, wilson_lower_bound, DEFAULT_Z};
