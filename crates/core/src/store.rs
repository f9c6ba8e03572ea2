//! Persistence boundary for arm state.
//!
//! The engine never mutates counters itself; every write goes through one of
//! the atomic operations below.

use crate::error::StorageResult;
use crate::types::Arm;
use uuid::Uuid;

/// Arm persistence used by the bandit engine.
///
/// Implementations are shared across concurrent callers. Increments must be
/// atomic with respect to each other: concurrent calls are never lost.
pub trait ArmStore: Send + Sync {
    /// Current snapshot of every arm in the test, in creation order.
    /// Returns an empty vector for an unknown test.
    fn load_arms(&self, test_id: &str) -> StorageResult<Vec<Arm>>;

    /// Persist all arms of a new test as one unit. Either every arm becomes
    /// visible to `load_arms` or none does. Fails with `TestExists` if the
    /// test already has arms.
    fn create_arms(&self, test_id: &str, arms: Vec<Arm>) -> StorageResult<Vec<Arm>>;

    /// Atomically add one impression. Fails with `ArmNotFound`.
    fn increment_impression(&self, arm_id: Uuid) -> StorageResult<()>;

    /// Atomically add one conversion and `revenue`. Fails with `ArmNotFound`.
    fn increment_conversion(&self, arm_id: Uuid, revenue: f64) -> StorageResult<()>;

    fn get_arm(&self, arm_id: Uuid) -> StorageResult<Option<Arm>>;
}
