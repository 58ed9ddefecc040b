//! # Regions
//!
//! Per-region tallies of checked vehicles.
//!
//! A number counts once per region. Counting runs as a single conditional update in the store
//! (`register_number`), never as read-modify-write here, so concurrent requests for the same region
//! cannot lose increments.
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    database::{CreateOutcome, Registration, Store, StoreError},
    models::{RegionDetail, RegionSnapshot, ValidationOutcome, VehicleRecord},
};

const PROBLEM_REGIONS: usize = 5;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Region {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    pub region_name: String,
    pub state: String,
    pub city: String,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub total_count: u64,
    pub registered_vehicles: u64,
    pub unmatched_count: u64,
}

impl From<RegionDetail> for RegionStats {
    fn from(region: RegionDetail) -> Self {
        let registered_vehicles = region.registered_numbers.len() as u64;
        let matched = region.valid_count + region.invalid_count;

        Self {
            registered_vehicles,
            unmatched_count: registered_vehicles.saturating_sub(matched),
            region_name: region.region_name,
            state: region.state,
            city: region.city,
            valid_count: region.valid_count,
            invalid_count: region.invalid_count,
            total_count: region.total_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemRegion {
    pub region_name: String,
    pub city: String,
    pub state: String,
    pub invalid_count: u64,
    pub total_count: u64,
    pub invalid_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionOverview {
    pub regions: Vec<RegionDetail>,
    pub problem_regions: Vec<ProblemRegion>,
}

pub struct RegionAggregator {
    store: Arc<dyn Store>,
}

impl RegionAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Counts the outcome's number in `region_name`. Resubmitting a counted number changes nothing.
    pub async fn apply(
        &self,
        region_name: &str,
        outcome: &ValidationOutcome,
    ) -> Result<RegionSnapshot, RegionError> {
        let registration = self
            .store
            .register_number(region_name, outcome.reg_no(), outcome.is_valid)
            .await?;

        match registration {
            Registration::RegionMissing => {
                return Err(RegionError::NotFound(region_name.to_string()));
            }
            Registration::AlreadyRegistered => {
                debug!(region = region_name, reg_no = outcome.reg_no(), "Already counted");
            }
            Registration::Counted => {
                info!(
                    region = region_name,
                    reg_no = outcome.reg_no(),
                    is_valid = outcome.is_valid,
                    "Region counters updated"
                );
            }
        }

        Ok(RegionSnapshot {
            is_new_entry: registration == Registration::Counted,
            region: self.require(region_name).await?,
        })
    }

    pub async fn check_and_create(
        &self,
        region_name: &str,
        city: &str,
        state: &str,
    ) -> Result<RegionSnapshot, RegionError> {
        let created = self
            .store
            .create_region(&RegionDetail::new(region_name, state, city))
            .await?;

        if created == CreateOutcome::Created {
            info!(region = region_name, "Region created");
        }

        Ok(RegionSnapshot {
            is_new_entry: created == CreateOutcome::Created,
            region: self.require(region_name).await?,
        })
    }

    pub async fn stats(&self, region_name: &str) -> Result<RegionStats, RegionError> {
        Ok(self.require(region_name).await?.into())
    }

    pub async fn vehicles(&self, region_name: &str) -> Result<Vec<VehicleRecord>, RegionError> {
        let region = self.require(region_name).await?;

        Ok(self.store.find_vehicles(&region.registered_numbers).await?)
    }

    pub async fn overview(&self) -> Result<RegionOverview, RegionError> {
        let regions = self.store.list_regions().await?;

        let mut problem_regions: Vec<ProblemRegion> = regions
            .iter()
            .map(|region| ProblemRegion {
                region_name: region.region_name.clone(),
                city: region.city.clone(),
                state: region.state.clone(),
                invalid_count: region.invalid_count,
                total_count: region.total_count,
                invalid_percentage: region.invalid_percentage(),
            })
            .collect();

        problem_regions.sort_by(|a, b| b.invalid_percentage.total_cmp(&a.invalid_percentage));
        problem_regions.truncate(PROBLEM_REGIONS);

        Ok(RegionOverview {
            regions,
            problem_regions,
        })
    }

    async fn require(&self, region_name: &str) -> Result<RegionDetail, RegionError> {
        self.store
            .find_region(region_name)
            .await?
            .ok_or_else(|| RegionError::NotFound(region_name.to_string()))
    }
}
