//! Simulated traffic: many workers share one engine, each impression converts
//! with the arm's configured true rate.

use clap::Args;
use menu_bandit_core::config::BanditConfig;
use menu_bandit_core::{ArmStat, BanditResult};
use menu_bandit_engine::{BanditEngine, RandomSource, SeededRandom};
use menu_bandit_store::InMemoryArmStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

const SIMULATION_TEST_ID: &str = "simulation";

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Arm as `name:true_rate`, repeat per arm
    #[arg(long = "arm", value_parser = parse_arm_spec, required = true)]
    pub arms: Vec<ArmSpec>,

    /// Total impressions to simulate
    #[arg(long, default_value_t = 10_000)]
    pub rounds: u64,

    /// Concurrent workers sharing the engine
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Revenue credited per conversion
    #[arg(long, default_value_t = 12.5)]
    pub revenue: f64,

    /// Seed for simulated customer behaviour
    #[arg(long, default_value_t = 7)]
    pub traffic_seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArmSpec {
    pub name: String,
    pub rate: f64,
}

fn parse_arm_spec(raw: &str) -> Result<ArmSpec, String> {
    let (name, rate) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected name:rate, got `{raw}`"))?;
    let rate: f64 = rate
        .trim()
        .parse()
        .map_err(|_| format!("bad conversion rate `{rate}`"))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("conversion rate must be within [0, 1], got {rate}"));
    }
    // Match the engine, which stores arm names trimmed.
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("arm name must not be blank in `{raw}`"));
    }
    Ok(ArmSpec {
        name: name.to_string(),
        rate,
    })
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub strategy: &'static str,
    pub rounds: u64,
    pub workers: usize,
    pub elapsed_ms: u128,
    /// Arm with the highest true rate.
    pub best_arm: String,
    /// Fraction of impressions the best arm received.
    pub best_arm_share: f64,
    pub total_conversions: u64,
    pub total_revenue: f64,
    pub stats: Vec<ArmStat>,
}

pub async fn run(config: &BanditConfig, args: SimulateArgs) -> anyhow::Result<SimulationReport> {
    anyhow::ensure!(args.workers > 0, "workers must be > 0");

    let store = Arc::new(InMemoryArmStore::new());
    let engine = Arc::new(BanditEngine::from_config(config, store)?);
    let names: Vec<&str> = args.arms.iter().map(|a| a.name.as_str()).collect();
    let arms = engine.create_test(SIMULATION_TEST_ID, names.as_slice())?;

    let rates: Arc<HashMap<Uuid, f64>> = Arc::new(
        arms.iter()
            .zip(&args.arms)
            .map(|(arm, spec)| (arm.id, spec.rate))
            .collect(),
    );
    let traffic = Arc::new(SeededRandom::new(args.traffic_seed));

    info!(
        strategy = engine.strategy().name(),
        arms = arms.len(),
        rounds = args.rounds,
        workers = args.workers,
        "Starting simulation"
    );

    let start = Instant::now();
    let workers = args.workers as u64;
    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..workers {
        let rounds = args.rounds / workers + u64::from(worker < args.rounds % workers);
        let engine = Arc::clone(&engine);
        let rates = Arc::clone(&rates);
        let traffic = Arc::clone(&traffic);
        let revenue = args.revenue;

        handles.push(tokio::task::spawn_blocking(move || -> BanditResult<()> {
            for _ in 0..rounds {
                let selection = engine.select_arm(SIMULATION_TEST_ID)?;
                engine.record_impression(selection.arm_id)?;
                let rate = rates.get(&selection.arm_id).copied().unwrap_or(0.0);
                if traffic.uniform() < rate {
                    engine.record_conversion(selection.arm_id, revenue)?;
                }
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    let elapsed_ms = start.elapsed().as_millis();

    let stats = engine.get_arm_stats(SIMULATION_TEST_ID)?;
    let best_spec = args
        .arms
        .iter()
        .fold(None::<&ArmSpec>, |best, spec| match best {
            Some(b) if b.rate >= spec.rate => Some(b),
            _ => Some(spec),
        });
    let best_arm = best_spec.map(|s| s.name.clone()).unwrap_or_default();
    let best_arm_share = stats
        .iter()
        .find(|s| s.arm_name == best_arm)
        .map(|s| s.traffic_share)
        .unwrap_or(0.0);

    info!(
        best_arm = %best_arm,
        best_arm_share,
        elapsed_ms = elapsed_ms as u64,
        "Simulation finished"
    );

    Ok(SimulationReport {
        strategy: engine.strategy().name(),
        rounds: args.rounds,
        workers: args.workers,
        elapsed_ms,
        best_arm,
        best_arm_share,
        total_conversions: stats.iter().map(|s| s.arm.conversions).sum(),
        total_revenue: stats.iter().map(|s| s.arm.revenue).sum(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use menu_bandit_core::config::BanditAlgorithm;

    fn args(rounds: u64, workers: usize) -> SimulateArgs {
        SimulateArgs {
            arms: vec![
                ArmSpec {
                    name: "Control".to_string(),
                    rate: 0.04,
                },
                ArmSpec {
                    name: "Free drink".to_string(),
                    rate: 0.12,
                },
            ],
            rounds,
            workers,
            revenue: 10.0,
            traffic_seed: 3,
        }
    }

    #[test]
    fn test_parse_arm_spec() {
        assert_eq!(
            parse_arm_spec("Half off: 2pm:0.1").unwrap(),
            ArmSpec {
                name: "Half off: 2pm".to_string(),
                rate: 0.1
            }
        );
        assert!(parse_arm_spec("Control").is_err());
        assert!(parse_arm_spec("Control:high").is_err());
        assert!(parse_arm_spec("Control:1.5").is_err());
        assert!(parse_arm_spec("  :0.2").is_err());
        assert_eq!(parse_arm_spec(" Control :0.1").unwrap().name, "Control");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simulation_reports_padded_best_arm() {
        let mut args = args(500, 2);
        args.arms = vec![
            parse_arm_spec(" Control:0.02").unwrap(),
            parse_arm_spec(" Free drink :0.2").unwrap(),
        ];
        let config = BanditConfig {
            epsilon: 1.0,
            seed: Some(4),
            ..Default::default()
        };
        let report = run(&config, args).await.unwrap();
        assert_eq!(report.best_arm, "Free drink");
        assert!(report.best_arm_share > 0.0, "share {}", report.best_arm_share);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simulation_counts_every_round() {
        let config = BanditConfig {
            algorithm: BanditAlgorithm::ThompsonSampling,
            seed: Some(11),
            ..Default::default()
        };
        let report = run(&config, args(3_001, 4)).await.unwrap();
        let impressions: u64 = report.stats.iter().map(|s| s.arm.impressions).sum();
        assert_eq!(impressions, 3_001);
        assert_eq!(report.best_arm, "Free drink");
        assert!(report.best_arm_share > 0.5, "share {}", report.best_arm_share);
        assert!((report.total_revenue - 10.0 * report.total_conversions as f64).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_simulation_rejects_zero_workers() {
        let config = BanditConfig::default();
        assert!(run(&config, args(10, 0)).await.is_err());
    }
}
