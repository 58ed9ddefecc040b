//! # PUC Validation
//!
//! Cache-or-lookup for one candidate plate.
//!
//! 1. A stored vehicle record answers directly, no external call
//! 2. Otherwise the RTO service is asked; errors and empty answers stay per-plate errors and are
//!    not stored
//! 3. A usable answer is stored only if absent. Losing that race to another request is not an
//!    error, the record that won is returned instead
//!
//! Within one process, concurrent validations of the same plate are serialized behind a per-plate
//! lock, so the second one finds the record the first one stored. The lock's map entry is owned by
//! a guard and goes away with the last caller, even one whose request was dropped mid-lookup.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use chrono::{Local, NaiveDate};
use remote::{RemoteError, RtoLookup};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    database::{InsertOutcome, Store, StoreError},
    models::{Source, ValidationOutcome, VehicleRecord},
};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Validation failed for RC Number {reg_no}: {source}")]
    Upstream {
        reg_no: String,
        #[source]
        source: RemoteError,
    },

    #[error("Validation failed for RC Number {0}: No data found or invalid response.")]
    NoResult(String),

    #[error("Could not persist RC Number {reg_no}: {source}")]
    Store {
        reg_no: String,
        #[source]
        source: StoreError,
    },
}

impl ValidationError {
    pub fn reg_no(&self) -> &str {
        match self {
            ValidationError::Upstream { reg_no, .. }
            | ValidationError::NoResult(reg_no)
            | ValidationError::Store { reg_no, .. } => reg_no,
        }
    }
}

type Inflight = StdMutex<HashMap<String, PlateSlot>>;

#[derive(Default)]
struct PlateSlot {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

/// One caller's claim on a plate's slot. Dropping it releases the claim.
struct PlateClaim<'a> {
    inflight: &'a Inflight,
    plate: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for PlateClaim<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(slot) = inflight.get_mut(&self.plate) {
            slot.holders -= 1;
            if slot.holders == 0 {
                inflight.remove(&self.plate);
            }
        }
    }
}

pub struct Validator {
    store: Arc<dyn Store>,
    rto: Arc<dyn RtoLookup>,
    inflight: Inflight,
}

impl Validator {
    pub fn new(store: Arc<dyn Store>, rto: Arc<dyn RtoLookup>) -> Self {
        Self {
            store,
            rto,
            inflight: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn validate(&self, plate: &str) -> Result<ValidationOutcome, ValidationError> {
        let claim = self.claim(plate);
        let _turn = claim.lock.lock().await;

        self.validate_locked(plate).await
    }

    fn claim(&self, plate: &str) -> PlateClaim<'_> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);

        let slot = inflight.entry(plate.to_string()).or_default();
        slot.holders += 1;

        PlateClaim {
            inflight: &self.inflight,
            plate: plate.to_string(),
            lock: Arc::clone(&slot.lock),
        }
    }

    async fn validate_locked(&self, plate: &str) -> Result<ValidationOutcome, ValidationError> {
        let store_error = |source| ValidationError::Store {
            reg_no: plate.to_string(),
            source,
        };

        if let Some(record) = self.store.find_vehicle(plate).await.map_err(store_error)? {
            info!("Vehicle found in database: {plate}");
            return Ok(ValidationOutcome::new(record, Source::Cache));
        }

        info!("Vehicle not found in database, performing external validation: {plate}");

        let result = self
            .rto
            .lookup(plate)
            .await
            .map_err(|source| ValidationError::Upstream {
                reg_no: plate.to_string(),
                source,
            })?
            .ok_or_else(|| ValidationError::NoResult(plate.to_string()))?;

        let record = VehicleRecord::from_lookup(plate, result, today());

        match self.store.insert_vehicle(&record).await.map_err(store_error)? {
            InsertOutcome::Inserted => Ok(ValidationOutcome::new(record, Source::External)),
            InsertOutcome::Conflict => {
                warn!("RC Number {plate} was stored concurrently, using the stored record");

                let existing = self
                    .store
                    .find_vehicle(plate)
                    .await
                    .map_err(store_error)?
                    .unwrap_or(record);

                Ok(ValidationOutcome::new(existing, Source::External))
            }
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
