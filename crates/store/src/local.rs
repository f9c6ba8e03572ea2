//! In-process arm store backed by DashMap with per-arm atomic counters.
//! Reads never take a lock that an increment waits on.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use menu_bandit_core::{Arm, ArmStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

struct ArmCell {
    id: Uuid,
    test_id: String,
    name: String,
    weight: Option<f64>,
    created_at: DateTime<Utc>,
    impressions: AtomicU64,
    conversions: AtomicU64,
    /// `f64` bit pattern.
    revenue: AtomicU64,
}

impl ArmCell {
    fn from_arm(arm: Arm) -> Self {
        Self {
            id: arm.id,
            test_id: arm.test_id,
            name: arm.name,
            weight: arm.weight,
            created_at: arm.created_at,
            impressions: AtomicU64::new(arm.impressions),
            conversions: AtomicU64::new(arm.conversions),
            revenue: AtomicU64::new(arm.revenue.to_bits()),
        }
    }

    fn snapshot(&self) -> Arm {
        Arm {
            id: self.id,
            test_id: self.test_id.clone(),
            name: self.name.clone(),
            impressions: self.impressions.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            revenue: f64::from_bits(self.revenue.load(Ordering::Relaxed)),
            weight: self.weight,
            created_at: self.created_at,
        }
    }

    fn add_revenue(&self, amount: f64) {
        let mut current = self.revenue.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + amount).to_bits();
            match self
                .revenue
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Lock-free in-memory [`ArmStore`].
#[derive(Default)]
pub struct InMemoryArmStore {
    tests: DashMap<String, Vec<Arc<ArmCell>>>,
    arms: DashMap<Uuid, Arc<ArmCell>>,
}

impl InMemoryArmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a test and all of its arms. Returns the number of arms removed.
    pub fn delete_test(&self, test_id: &str) -> usize {
        match self.tests.remove(test_id) {
            Some((_, cells)) => {
                for cell in &cells {
                    self.arms.remove(&cell.id);
                }
                debug!(test_id = %test_id, arms = cells.len(), "Test removed from memory store");
                cells.len()
            }
            None => 0,
        }
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    pub fn arm_count(&self) -> usize {
        self.arms.len()
    }

    fn cell(&self, arm_id: Uuid) -> StorageResult<Arc<ArmCell>> {
        self.arms
            .get(&arm_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(StorageError::ArmNotFound(arm_id))
    }
}

impl ArmStore for InMemoryArmStore {
    fn load_arms(&self, test_id: &str) -> StorageResult<Vec<Arm>> {
        Ok(self
            .tests
            .get(test_id)
            .map(|cells| cells.iter().map(|c| c.snapshot()).collect())
            .unwrap_or_default())
    }

    fn create_arms(&self, test_id: &str, arms: Vec<Arm>) -> StorageResult<Vec<Arm>> {
        if arms.is_empty() {
            return Ok(Vec::new());
        }
        // The test entry stays locked until every arm is indexed, so
        // `load_arms` observes either the whole set or nothing.
        match self.tests.entry(test_id.to_string()) {
            Entry::Occupied(_) => Err(StorageError::TestExists(test_id.to_string())),
            Entry::Vacant(slot) => {
                let cells: Vec<Arc<ArmCell>> = arms
                    .into_iter()
                    .map(|arm| Arc::new(ArmCell::from_arm(arm)))
                    .collect();
                for cell in &cells {
                    self.arms.insert(cell.id, Arc::clone(cell));
                }
                let created = cells.iter().map(|c| c.snapshot()).collect();
                slot.insert(cells);
                Ok(created)
            }
        }
    }

    fn increment_impression(&self, arm_id: Uuid) -> StorageResult<()> {
        self.cell(arm_id)?.impressions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn increment_conversion(&self, arm_id: Uuid, revenue: f64) -> StorageResult<()> {
        let cell = self.cell(arm_id)?;
        cell.conversions.fetch_add(1, Ordering::Relaxed);
        cell.add_revenue(revenue);
        Ok(())
    }

    fn get_arm(&self, arm_id: Uuid) -> StorageResult<Option<Arm>> {
        Ok(self.arms.get(&arm_id).map(|c| c.snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arms(test_id: &str, names: &[&str]) -> Vec<Arm> {
        names.iter().map(|n| Arm::new(test_id, *n)).collect()
    }

    #[test]
    fn test_create_and_load_in_order() {
        let store = InMemoryArmStore::new();
        let created = store
            .create_arms("offer-1", arms("offer-1", &["Control", "Treatment A", "Treatment B"]))
            .unwrap();
        let loaded = store.load_arms("offer-1").unwrap();
        assert_eq!(created, loaded);
        let names: Vec<_> = loaded.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Control", "Treatment A", "Treatment B"]);
        assert_eq!(store.arm_count(), 3);
    }

    #[test]
    fn test_duplicate_test_rejected() {
        let store = InMemoryArmStore::new();
        store.create_arms("offer-1", arms("offer-1", &["A"])).unwrap();
        let err = store
            .create_arms("offer-1", arms("offer-1", &["B"]))
            .unwrap_err();
        assert!(matches!(err, StorageError::TestExists(_)));
        assert_eq!(store.arm_count(), 1);
    }

    #[test]
    fn test_unknown_test_loads_empty() {
        let store = InMemoryArmStore::new();
        assert!(store.load_arms("nope").unwrap().is_empty());
        store.create_arms("offer-1", Vec::new()).unwrap();
        assert_eq!(store.test_count(), 0);
    }

    #[test]
    fn test_increments() {
        let store = InMemoryArmStore::new();
        let created = store.create_arms("offer-1", arms("offer-1", &["A"])).unwrap();
        let id = created[0].id;
        store.increment_impression(id).unwrap();
        store.increment_impression(id).unwrap();
        store.increment_conversion(id, 12.5).unwrap();
        store.increment_conversion(id, 0.25).unwrap();
        let arm = store.get_arm(id).unwrap().unwrap();
        assert_eq!(arm.impressions, 2);
        assert_eq!(arm.conversions, 2);
        assert!((arm.revenue - 12.75).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_arm() {
        let store = InMemoryArmStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.increment_impression(id),
            Err(StorageError::ArmNotFound(x)) if x == id
        ));
        assert!(store.increment_conversion(id, 1.0).is_err());
        assert!(store.get_arm(id).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_revenue_not_lost() {
        let store = InMemoryArmStore::new();
        let id = store.create_arms("offer-1", arms("offer-1", &["A"])).unwrap()[0].id;
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        store.increment_conversion(id, 0.5).unwrap();
                    }
                });
            }
        });
        let arm = store.get_arm(id).unwrap().unwrap();
        assert_eq!(arm.conversions, 8_000);
        assert!((arm.revenue - 4_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_delete_test() {
        let store = InMemoryArmStore::new();
        let created = store.create_arms("offer-1", arms("offer-1", &["A", "B"])).unwrap();
        assert_eq!(store.delete_test("offer-1"), 2);
        assert_eq!(store.delete_test("offer-1"), 0);
        assert!(store.load_arms("offer-1").unwrap().is_empty());
        assert!(store.increment_impression(created[0].id).is_err());
        // the id is free again
        store.create_arms("offer-1", arms("offer-1", &["C"])).unwrap();
    }
}
