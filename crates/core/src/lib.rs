pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{BanditError, BanditResult, StorageError, StorageResult};
pub use store::ArmStore;
pub use types::{Arm, ArmStat, ExplorationReason, Selection};
