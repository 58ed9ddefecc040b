use chrono::{DateTime, NaiveDate, Utc};
use remote::RtoResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VALID_MESSAGE: &str = "PUC is Valid!!";
pub const INVALID_MESSAGE: &str = "PUC is Invalid!!";

/// Persisted lookup result, unique per `reg_no`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub reg_no: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub reg_type_descr: String,
    #[serde(default)]
    pub vehicle_class_desc: String,
    #[serde(default)]
    pub reg_upto: String,
    #[serde(default)]
    pub vehicle_pucc_details: Value,
    pub checked_on: NaiveDate,
}

impl VehicleRecord {
    /// Keyed by the plate that was looked up, whatever spelling the service echoes back.
    pub fn from_lookup(reg_no: &str, result: RtoResult, checked_on: NaiveDate) -> Self {
        Self {
            reg_no: reg_no.to_string(),
            owner_name: result.owner_name.unwrap_or_default(),
            model: result.model.unwrap_or_default(),
            state: result.state.unwrap_or_default(),
            reg_type_descr: result.reg_type_descr.unwrap_or_default(),
            vehicle_class_desc: result.vehicle_class_desc.unwrap_or_default(),
            reg_upto: result.reg_upto.unwrap_or_default(),
            vehicle_pucc_details: result.vehicle_pucc_details,
            checked_on,
        }
    }

    pub fn is_valid(&self) -> bool {
        is_truthy(&self.vehicle_pucc_details)
    }

    pub fn vehicle_class(&self) -> &str {
        match self.vehicle_class_desc.trim() {
            "" => UNKNOWN_CLASS,
            class => class,
        }
    }
}

pub const UNKNOWN_CLASS: &str = "Unknown";

/// Number of stored vehicles sharing one `vehicle_class_desc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleClassCount {
    pub name: String,
    pub count: u64,
}

impl VehicleClassCount {
    /// Most common first, ties by name.
    pub fn ranked(mut counts: Vec<Self>) -> Vec<Self> {
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        counts
    }
}

/// JavaScript truthiness, which is how the lookup service signals a live certificate.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub message: &'static str,
    pub is_valid: bool,
    pub sourced_from: Source,
    #[serde(flatten)]
    pub record: VehicleRecord,
}

impl ValidationOutcome {
    pub fn new(record: VehicleRecord, sourced_from: Source) -> Self {
        let is_valid = record.is_valid();

        Self {
            message: if is_valid {
                VALID_MESSAGE
            } else {
                INVALID_MESSAGE
            },
            is_valid,
            sourced_from,
            record,
        }
    }

    pub fn reg_no(&self) -> &str {
        &self.record.reg_no
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpmReading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDetail {
    pub region_name: String,
    pub state: String,
    pub city: String,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub total_count: u64,
    pub registered_numbers: Vec<String>,
    pub ppm_values: Vec<PpmReading>,
}

impl RegionDetail {
    pub fn new(region_name: &str, state: &str, city: &str) -> Self {
        Self {
            region_name: region_name.to_string(),
            state: state.to_string(),
            city: city.to_string(),
            valid_count: 0,
            invalid_count: 0,
            total_count: 0,
            registered_numbers: Vec::new(),
            ppm_values: Vec::new(),
        }
    }

    pub fn is_registered(&self, reg_no: &str) -> bool {
        self.registered_numbers.iter().any(|n| n == reg_no)
    }

    pub fn invalid_percentage(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }

        self.invalid_count as f64 / self.total_count as f64 * 100.0
    }
}

/// Region state right after an aggregator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSnapshot {
    pub is_new_entry: bool,
    pub region: RegionDetail,
}
