use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One treatment within a test (a menu offer variant, promo copy, price point).
///
/// Counters only ever grow. `conversions <= impressions` holds eventually but
/// may be briefly violated while concurrent recordings are in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    pub id: Uuid,
    pub test_id: String,
    pub name: String,
    pub impressions: u64,
    pub conversions: u64,
    pub revenue: f64,
    /// Externally assigned allocation prior. Never written by the engine.
    #[serde(default)]
    pub weight: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Arm {
    pub fn new(test_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id: test_id.into(),
            name: name.into(),
            impressions: 0,
            conversions: 0,
            revenue: 0.0,
            weight: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }

    /// Observed conversion rate, `0` before the first impression.
    pub fn conversion_rate(&self) -> f64 {
        if self.impressions > 0 {
            self.conversions as f64 / self.impressions as f64
        } else {
            0.0
        }
    }

    pub fn revenue_per_impression(&self) -> f64 {
        if self.impressions > 0 {
            self.revenue / self.impressions as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationReason {
    Exploit,
    Explore,
}

impl ExplorationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplorationReason::Exploit => "exploit",
            ExplorationReason::Explore => "explore",
        }
    }
}

impl std::fmt::Display for ExplorationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The arm chosen for one impression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub arm_id: Uuid,
    pub test_id: String,
    pub arm_name: String,
    pub exploration_reason: ExplorationReason,
}

impl Selection {
    pub fn for_arm(arm: &Arm, exploration_reason: ExplorationReason) -> Self {
        Self {
            arm_id: arm.id,
            test_id: arm.test_id.clone(),
            arm_name: arm.name.clone(),
            exploration_reason,
        }
    }
}

/// Read-only report row derived from an arm's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmStat {
    pub arm_id: Uuid,
    pub arm_name: String,
    pub arm: Arm,
    pub conversion_rate: f64,
    /// Wilson score lower bound of the conversion rate.
    pub confidence_lower_bound: f64,
    pub confidence_upper_bound: f64,
    pub revenue_per_impression: f64,
    /// Share of the test's impressions served by this arm.
    pub traffic_share: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_guard_zero_impressions() {
        let arm = Arm::new("offer-1", "Control");
        assert_eq!(arm.conversion_rate(), 0.0);
        assert_eq!(arm.revenue_per_impression(), 0.0);
    }

    #[test]
    fn test_rates_from_counters() {
        let mut arm = Arm::new("offer-1", "Control");
        arm.impressions = 40;
        arm.conversions = 10;
        arm.revenue = 120.0;
        assert!((arm.conversion_rate() - 0.25).abs() < 1e-12);
        assert!((arm.revenue_per_impression() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ExplorationReason::Explore).unwrap();
        assert_eq!(json, "\"explore\"");
        assert_eq!(ExplorationReason::Exploit.to_string(), "exploit");
    }
}
