//! Injectable uniform random source.
//!
//! Every stochastic decision in the engine draws from a [`RandomSource`], so a
//! fixed seed or a scripted sequence makes selection reproducible.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Uniform random draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn uniform(&self) -> f64;
}

/// `StdRng` shared behind a lock so one instance serves concurrent callers.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: AtomicUsize,
}

impl ScriptedRandom {
    /// Values outside `[0, 1)` are clamped into range. An empty script
    /// always yields `0.0`.
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let values = values
            .into()
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        Self {
            values,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn uniform(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[idx]
    }
}
