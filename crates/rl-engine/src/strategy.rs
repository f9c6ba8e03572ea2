//! Arm selection policies.
//!
//! Both policies are stateless apart from their configuration; all learning
//! lives in the arm counters held by the store.

use crate::random::RandomSource;
use crate::sampling::sample_beta;
use menu_bandit_core::config::{BanditAlgorithm, BanditConfig};
use menu_bandit_core::{Arm, BanditError, BanditResult, ExplorationReason, Selection};

/// Explore uniformly with probability `epsilon`, otherwise exploit the arm
/// with the best observed conversion rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpsilonGreedy {
    epsilon: f64,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> BanditResult<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(BanditError::InvalidArgument(format!(
                "epsilon must be within [0, 1], got {epsilon}"
            )));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn select<R: RandomSource + ?Sized>(
        &self,
        test_id: &str,
        arms: &[Arm],
        rng: &R,
    ) -> BanditResult<Selection> {
        if arms.is_empty() {
            return Err(BanditError::NoArmsForTest(test_id.to_string()));
        }

        if rng.uniform() < self.epsilon {
            let idx = ((rng.uniform() * arms.len() as f64) as usize).min(arms.len() - 1);
            return Ok(Selection::for_arm(&arms[idx], ExplorationReason::Explore));
        }

        let mut best = &arms[0];
        let mut best_rate = best.conversion_rate();
        for arm in &arms[1..] {
            let rate = arm.conversion_rate();
            if rate > best_rate {
                best_rate = rate;
                best = arm;
            }
        }
        Ok(Selection::for_arm(best, ExplorationReason::Exploit))
    }
}

/// Sample each arm's rate from its Beta posterior (uniform prior) and pick the
/// highest sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThompsonSampling;

impl ThompsonSampling {
    /// Winning samples above this are labelled `exploit`.
    pub const EXPLOIT_LABEL_THRESHOLD: f64 = 0.5;

    pub fn new() -> Self {
        Self
    }

    pub fn select<R: RandomSource + ?Sized>(
        &self,
        test_id: &str,
        arms: &[Arm],
        rng: &R,
    ) -> BanditResult<Selection> {
        if arms.is_empty() {
            return Err(BanditError::NoArmsForTest(test_id.to_string()));
        }

        let mut best: Option<(&Arm, f64)> = None;
        for arm in arms {
            let alpha = arm.conversions as f64 + 1.0;
            let beta = arm.impressions.saturating_sub(arm.conversions) as f64 + 1.0;
            let theta = sample_beta(rng, alpha, beta)?;
            match best {
                Some((_, best_theta)) if theta <= best_theta => {}
                _ => best = Some((arm, theta)),
            }
        }

        let (arm, theta) = best.ok_or_else(|| BanditError::NoArmsForTest(test_id.to_string()))?;
        // Reporting label only; it does not affect which arm is chosen.
        let reason = if theta > Self::EXPLOIT_LABEL_THRESHOLD {
            ExplorationReason::Exploit
        } else {
            ExplorationReason::Explore
        };
        Ok(Selection::for_arm(arm, reason))
    }
}

/// Selection policy chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionStrategy {
    EpsilonGreedy(EpsilonGreedy),
    ThompsonSampling(ThompsonSampling),
}

impl SelectionStrategy {
    pub fn epsilon_greedy(epsilon: f64) -> BanditResult<Self> {
        Ok(Self::EpsilonGreedy(EpsilonGreedy::new(epsilon)?))
    }

    pub fn thompson_sampling() -> Self {
        Self::ThompsonSampling(ThompsonSampling::new())
    }

    pub fn from_config(config: &BanditConfig) -> BanditResult<Self> {
        match config.algorithm {
            BanditAlgorithm::EpsilonGreedy => Self::epsilon_greedy(config.epsilon),
            BanditAlgorithm::ThompsonSampling => Ok(Self::thompson_sampling()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::EpsilonGreedy(_) => "epsilon_greedy",
            SelectionStrategy::ThompsonSampling(_) => "thompson_sampling",
        }
    }

    pub fn select<R: RandomSource + ?Sized>(
        &self,
        test_id: &str,
        arms: &[Arm],
        rng: &R,
    ) -> BanditResult<Selection> {
        match self {
            SelectionStrategy::EpsilonGreedy(s) => s.select(test_id, arms, rng),
            SelectionStrategy::ThompsonSampling(s) => s.select(test_id, arms, rng),
        }
    }
}
