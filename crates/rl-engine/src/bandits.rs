//! Multi-armed bandit engine for menu offer tests.
//!
//! The engine holds no counters of its own: every read is a snapshot from the
//! [`ArmStore`] and every write is one atomic store increment, so a single
//! instance can be shared by all request handlers.

use crate::random::{RandomSource, SeededRandom};
use crate::strategy::SelectionStrategy;
use crate::wilson::{wilson_interval, DEFAULT_Z};
use menu_bandit_core::config::BanditConfig;
use menu_bandit_core::{
    Arm, ArmStat, ArmStore, BanditError, BanditResult, Selection, StorageError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct BanditEngine {
    strategy: SelectionStrategy,
    rng: Arc<dyn RandomSource>,
    store: Arc<dyn ArmStore>,
    confidence_z: f64,
}

impl BanditEngine {
    pub fn new(
        strategy: SelectionStrategy,
        rng: Arc<dyn RandomSource>,
        store: Arc<dyn ArmStore>,
    ) -> Self {
        Self {
            strategy,
            rng,
            store,
            confidence_z: DEFAULT_Z,
        }
    }

    /// Epsilon-greedy engine. Fails if `epsilon` is outside `[0, 1]`.
    pub fn epsilon_greedy(
        epsilon: f64,
        rng: Arc<dyn RandomSource>,
        store: Arc<dyn ArmStore>,
    ) -> BanditResult<Self> {
        Ok(Self::new(SelectionStrategy::epsilon_greedy(epsilon)?, rng, store))
    }

    pub fn thompson_sampling(rng: Arc<dyn RandomSource>, store: Arc<dyn ArmStore>) -> Self {
        Self::new(SelectionStrategy::thompson_sampling(), rng, store)
    }

    /// Build from configuration, seeding the random source from `config.seed`.
    pub fn from_config(config: &BanditConfig, store: Arc<dyn ArmStore>) -> BanditResult<Self> {
        let strategy = SelectionStrategy::from_config(config)?;
        let rng: Arc<dyn RandomSource> = Arc::new(SeededRandom::from_seed_option(config.seed));
        Self::new(strategy, rng, store).with_confidence_z(config.confidence_z)
    }

    pub fn with_confidence_z(mut self, z: f64) -> BanditResult<Self> {
        if !z.is_finite() || z <= 0.0 {
            return Err(BanditError::InvalidArgument(format!(
                "confidence z must be finite and > 0, got {z}"
            )));
        }
        self.confidence_z = z;
        Ok(self)
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    pub fn confidence_z(&self) -> f64 {
        self.confidence_z
    }

    /// Create every arm of a new test at once, counters at zero, returned in
    /// input order.
    pub fn create_test<S: AsRef<str>>(&self, test_id: &str, arm_names: &[S]) -> BanditResult<Vec<Arm>> {
        let arms: Vec<(&str, Option<f64>)> = arm_names.iter().map(|n| (n.as_ref(), None)).collect();
        self.create_test_weighted(test_id, arms.as_slice())
    }

    /// Like [`create_test`](Self::create_test) with an optional allocation
    /// weight stored on each arm.
    pub fn create_test_weighted<S: AsRef<str>>(
        &self,
        test_id: &str,
        arms: &[(S, Option<f64>)],
    ) -> BanditResult<Vec<Arm>> {
        if test_id.trim().is_empty() {
            return Err(invalid("test id must not be blank"));
        }
        if arms.is_empty() {
            return Err(invalid("a test needs at least one arm"));
        }

        let mut seen = HashSet::with_capacity(arms.len());
        let mut new_arms = Vec::with_capacity(arms.len());
        for (name, weight) in arms {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(invalid("arm names must not be blank"));
            }
            if !seen.insert(name) {
                warn!(test_id = %test_id, arm_name = %name, "Duplicate arm name rejected");
                return Err(invalid(format!("duplicate arm name: {name}")));
            }
            if let Some(w) = weight {
                if !w.is_finite() || *w < 0.0 {
                    return Err(invalid(format!("arm weight must be finite and >= 0, got {w}")));
                }
            }
            new_arms.push(Arm::new(test_id, name).with_weight(*weight));
        }

        let created = self
            .store
            .create_arms(test_id, new_arms)
            .map_err(map_storage_error)?;

        metrics::counter!("bandit.tests.created").increment(1);
        info!(test_id = %test_id, arms = created.len(), "Bandit test created");
        Ok(created)
    }

    /// Choose an arm for the next impression.
    ///
    /// `NoArmsForTest` is the expected outcome for an unknown or empty test;
    /// callers should serve their default treatment.
    pub fn select_arm(&self, test_id: &str) -> BanditResult<Selection> {
        let arms = self.store.load_arms(test_id)?;
        if arms.is_empty() {
            metrics::counter!("bandit.selection.no_arms").increment(1);
            return Err(BanditError::NoArmsForTest(test_id.to_string()));
        }

        let selection = self.strategy.select(test_id, &arms, self.rng.as_ref())?;

        metrics::counter!(
            "bandit.selections",
            "strategy" => self.strategy.name(),
            "reason" => selection.exploration_reason.as_str()
        )
        .increment(1);
        debug!(
            test_id = %test_id,
            arm_id = %selection.arm_id,
            reason = %selection.exploration_reason,
            "Arm selected"
        );
        Ok(selection)
    }

    pub fn record_impression(&self, arm_id: Uuid) -> BanditResult<()> {
        self.store
            .increment_impression(arm_id)
            .map_err(map_storage_error)?;
        metrics::counter!("bandit.impressions").increment(1);
        debug!(arm_id = %arm_id, "Impression recorded");
        Ok(())
    }

    /// Record one conversion worth `revenue`. Negative or non-finite revenue
    /// is rejected before anything is written.
    pub fn record_conversion(&self, arm_id: Uuid, revenue: f64) -> BanditResult<()> {
        if !revenue.is_finite() || revenue < 0.0 {
            warn!(arm_id = %arm_id, revenue, "Rejected conversion with invalid revenue");
            return Err(invalid(format!(
                "revenue must be finite and >= 0, got {revenue}"
            )));
        }
        self.store
            .increment_conversion(arm_id, revenue)
            .map_err(map_storage_error)?;
        metrics::counter!("bandit.conversions").increment(1);
        metrics::histogram!("bandit.conversion.revenue").record(revenue);
        debug!(arm_id = %arm_id, revenue, "Conversion recorded");
        Ok(())
    }

    pub fn get_arm(&self, arm_id: Uuid) -> BanditResult<Arm> {
        self.store
            .get_arm(arm_id)?
            .ok_or(BanditError::ArmNotFound(arm_id))
    }

    /// Per-arm report derived from a snapshot of the counters.
    pub fn get_arm_stats(&self, test_id: &str) -> BanditResult<Vec<ArmStat>> {
        let arms = self.store.load_arms(test_id)?;
        if arms.is_empty() {
            return Err(BanditError::NoArmsForTest(test_id.to_string()));
        }

        let total_impressions: u64 = arms.iter().map(|a| a.impressions).sum();
        let arm_count = arms.len();

        let stats = arms
            .into_iter()
            .map(|arm| {
                let (lower, upper) =
                    wilson_interval(arm.conversions, arm.impressions, self.confidence_z);
                let traffic_share = if total_impressions > 0 {
                    arm.impressions as f64 / total_impressions as f64
                } else {
                    1.0 / arm_count as f64
                };
                ArmStat {
                    arm_id: arm.id,
                    arm_name: arm.name.clone(),
                    conversion_rate: arm.conversion_rate(),
                    confidence_lower_bound: lower,
                    confidence_upper_bound: upper,
                    revenue_per_impression: arm.revenue_per_impression(),
                    traffic_share,
                    arm,
                }
            })
            .collect();

        Ok(stats)
    }
}

fn invalid(message: impl Into<String>) -> BanditError {
    BanditError::InvalidArgument(message.into())
}

fn map_storage_error(err: StorageError) -> BanditError {
    match err {
        StorageError::ArmNotFound(id) => BanditError::ArmNotFound(id),
        StorageError::TestExists(test_id) => {
            invalid(format!("test {test_id} already has arms"))
        }
        other => BanditError::Storage(other),
    }
}
