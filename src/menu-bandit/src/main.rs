//! menu-bandit: operator CLI for the menu offer bandit engine.
//!
//! Loads configuration, wires the engine to the configured arm store and runs
//! one command. Results are printed as JSON on stdout; logs go to stderr.

mod simulate;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use menu_bandit_core::config::{AppConfig, BanditAlgorithm, StoreBackend};
use menu_bandit_core::{ArmStore, BanditError};
use menu_bandit_engine::BanditEngine;
use menu_bandit_store::{InMemoryArmStore, RedisArmStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "menu-bandit")]
#[command(about = "Online arm selection for menu offer tests")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables still apply on top)
    #[arg(long, env = "MENU_BANDIT_CONFIG")]
    config: Option<String>,

    /// Selection algorithm (overrides config)
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// Exploration rate for epsilon-greedy (overrides config)
    #[arg(long)]
    epsilon: Option<f64>,

    /// RNG seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Use the Redis store at this URL (overrides config)
    #[arg(long)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlgorithmArg {
    EpsilonGreedy,
    ThompsonSampling,
}

impl From<AlgorithmArg> for BanditAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::EpsilonGreedy => BanditAlgorithm::EpsilonGreedy,
            AlgorithmArg::ThompsonSampling => BanditAlgorithm::ThompsonSampling,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Store(StoreCommand),
    /// Run simulated traffic against a fresh in-memory store
    Simulate(simulate::SimulateArgs),
}

/// Commands that run against the configured arm store.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Create a test with one arm per name
    CreateTest {
        test_id: String,
        #[arg(required = true)]
        arms: Vec<String>,
        /// Allocation weight per arm, in arm order (one per arm, or none)
        #[arg(long = "weight")]
        weights: Vec<f64>,
    },
    /// Choose an arm for the next impression
    Select { test_id: String },
    /// Record that an arm was shown
    Impression { arm_id: Uuid },
    /// Record a conversion and its revenue
    Conversion {
        arm_id: Uuid,
        #[arg(allow_hyphen_values = true)]
        revenue: f64,
    },
    /// Print per-arm statistics
    Stats { test_id: String },
}

#[derive(Serialize)]
struct NoDecision<'a> {
    test_id: &'a str,
    decision: Option<()>,
    reason: &'a str,
}

/// Pair arm names with `--weight` values by position. Names are used verbatim.
fn pair_weights(arms: Vec<String>, weights: Vec<f64>) -> anyhow::Result<Vec<(String, Option<f64>)>> {
    if weights.is_empty() {
        return Ok(arms.into_iter().map(|name| (name, None)).collect());
    }
    anyhow::ensure!(
        weights.len() == arms.len(),
        "got {} weights for {} arms; pass one --weight per arm or none",
        weights.len(),
        arms.len()
    );
    Ok(arms.into_iter().zip(weights.into_iter().map(Some)).collect())
}

/// An explicit config file must load; without one, a bad environment falls
/// back to defaults.
fn load_config(path: Option<&str>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(Some(path))
            .with_context(|| format!("failed to load config from {path}")),
        None => Ok(AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config from environment, using defaults");
            AppConfig::default()
        })),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ArmStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory arm store; state is discarded on exit");
            Ok(Arc::new(InMemoryArmStore::new()))
        }
        StoreBackend::Redis => Ok(Arc::new(
            RedisArmStore::new(&config.store).context("failed to open Redis arm store")?,
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "menu_bandit=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(algorithm) = cli.algorithm {
        config.bandit.algorithm = algorithm.into();
    }
    if let Some(epsilon) = cli.epsilon {
        config.bandit.epsilon = epsilon;
    }
    if let Some(seed) = cli.seed {
        config.bandit.seed = Some(seed);
    }
    if let Some(url) = cli.redis_url {
        config.store.backend = StoreBackend::Redis;
        config.store.redis_url = url;
    }

    info!(
        node_id = %config.node_id,
        algorithm = ?config.bandit.algorithm,
        epsilon = config.bandit.epsilon,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    match cli.command {
        Command::Simulate(args) => {
            let report = simulate::run(&config.bandit, args).await?;
            print_json(&report)
        }
        Command::Store(command) => run_store_command(&config, command),
    }
}

fn run_store_command(config: &AppConfig, command: StoreCommand) -> anyhow::Result<()> {
    let store = build_store(config)?;
    let engine = BanditEngine::from_config(&config.bandit, store)?;

    match command {
        StoreCommand::CreateTest {
            test_id,
            arms,
            weights,
        } => {
            let arms = pair_weights(arms, weights)?;
            let created = engine.create_test_weighted(&test_id, arms.as_slice())?;
            print_json(&created)
        }
        StoreCommand::Select { test_id } => match engine.select_arm(&test_id) {
            Ok(selection) => print_json(&selection),
            Err(BanditError::NoArmsForTest(_)) => print_json(&NoDecision {
                test_id: &test_id,
                decision: None,
                reason: "no_arms_for_test",
            }),
            Err(e) => Err(e.into()),
        },
        StoreCommand::Impression { arm_id } => {
            engine.record_impression(arm_id)?;
            print_json(&engine.get_arm(arm_id)?)
        }
        StoreCommand::Conversion { arm_id, revenue } => {
            engine.record_conversion(arm_id, revenue)?;
            print_json(&engine.get_arm(arm_id)?)
        }
        StoreCommand::Stats { test_id } => print_json(&engine.get_arm_stats(&test_id)?),
    }
}
