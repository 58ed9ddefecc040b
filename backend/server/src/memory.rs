use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    database::{CreateOutcome, InsertOutcome, Registration, Store, StoreError},
    models::{RegionDetail, VehicleClassCount, VehicleRecord},
};

/// In-process store with the same atomicity as the Redis one: every operation runs under one lock.
#[derive(Default)]
pub struct MemoryStore {
    vehicles: Mutex<HashMap<String, VehicleRecord>>,
    regions: Mutex<BTreeMap<String, RegionDetail>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_vehicle(&self, reg_no: &str) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(self.vehicles.lock().await.get(reg_no).cloned())
    }

    async fn find_vehicles(&self, reg_nos: &[String]) -> Result<Vec<VehicleRecord>, StoreError> {
        let vehicles = self.vehicles.lock().await;

        Ok(reg_nos
            .iter()
            .filter_map(|reg_no| vehicles.get(reg_no).cloned())
            .collect())
    }

    async fn insert_vehicle(&self, record: &VehicleRecord) -> Result<InsertOutcome, StoreError> {
        let mut vehicles = self.vehicles.lock().await;

        if vehicles.contains_key(&record.reg_no) {
            return Ok(InsertOutcome::Conflict);
        }

        vehicles.insert(record.reg_no.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn vehicle_classes(&self) -> Result<Vec<VehicleClassCount>, StoreError> {
        let vehicles = self.vehicles.lock().await;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for record in vehicles.values() {
            *counts.entry(record.vehicle_class()).or_default() += 1;
        }

        Ok(VehicleClassCount::ranked(
            counts
                .into_iter()
                .map(|(name, count)| VehicleClassCount {
                    name: name.to_string(),
                    count,
                })
                .collect(),
        ))
    }

    async fn find_region(&self, region_name: &str) -> Result<Option<RegionDetail>, StoreError> {
        Ok(self.regions.lock().await.get(region_name).cloned())
    }

    async fn list_regions(&self) -> Result<Vec<RegionDetail>, StoreError> {
        Ok(self.regions.lock().await.values().cloned().collect())
    }

    async fn create_region(&self, region: &RegionDetail) -> Result<CreateOutcome, StoreError> {
        let mut regions = self.regions.lock().await;

        if regions.contains_key(&region.region_name) {
            return Ok(CreateOutcome::Exists);
        }

        regions.insert(region.region_name.clone(), region.clone());
        Ok(CreateOutcome::Created)
    }

    async fn register_number(
        &self,
        region_name: &str,
        reg_no: &str,
        is_valid: bool,
    ) -> Result<Registration, StoreError> {
        let mut regions = self.regions.lock().await;

        let Some(region) = regions.get_mut(region_name) else {
            return Ok(Registration::RegionMissing);
        };

        if region.is_registered(reg_no) {
            return Ok(Registration::AlreadyRegistered);
        }

        region.registered_numbers.push(reg_no.to_string());
        region.total_count += 1;
        if is_valid {
            region.valid_count += 1;
        } else {
            region.invalid_count += 1;
        }

        Ok(Registration::Counted)
    }
}
