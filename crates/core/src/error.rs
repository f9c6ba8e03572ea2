use thiserror::Error;
use uuid::Uuid;

pub type BanditResult<T> = Result<T, BanditError>;
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the bandit engine to its callers.
#[derive(Error, Debug)]
pub enum BanditError {
    /// The test has no arms. Expected for new or unknown tests; callers
    /// should fall back to a default treatment.
    #[error("No arms for test: {0}")]
    NoArmsForTest(String),

    #[error("Arm not found: {0}")]
    ArmNotFound(Uuid),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BanditError {
    /// True when the caller should apply a safe default instead of failing
    /// the request.
    pub fn is_no_decision(&self) -> bool {
        matches!(self, BanditError::NoArmsForTest(_))
    }
}

/// Errors raised by an [`ArmStore`](crate::ArmStore) implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Arm not found: {0}")]
    ArmNotFound(Uuid),

    #[error("Test already exists: {0}")]
    TestExists(String),

    #[error("Corrupt arm record: {0}")]
    Corrupt(String),

    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
