use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `MENU_BANDIT__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub bandit: BanditConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanditAlgorithm {
    #[default]
    EpsilonGreedy,
    ThompsonSampling,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditConfig {
    #[serde(default)]
    pub algorithm: BanditAlgorithm,
    /// Fraction of epsilon-greedy decisions that explore.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Fixed RNG seed. Unset means seed from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// z-score for Wilson bounds in reports (1.96 = 95%).
    #[serde(default = "default_confidence_z")]
    pub confidence_z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_epsilon() -> f64 {
    0.1
}
fn default_confidence_z() -> f64 {
    1.96
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_key_prefix() -> String {
    "menu_bandit".to_string()
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            algorithm: BanditAlgorithm::default(),
            epsilon: default_epsilon(),
            seed: None,
            confidence_z: default_confidence_z(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            bandit: BanditConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from environment only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load from an optional TOML file, then environment variables on top.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("MENU_BANDIT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
