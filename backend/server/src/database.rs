//! # Redis
//!
//! Persistence for vehicle lookups and region counters.
//!
//! ## Requirements
//!
//! - At most one vehicle record per registration number, even when two requests race on it
//! - Region counters never lose an update when requests for the same region interleave
//! - A number is counted once per region, however often it is resubmitted
//!
//! ## Implementation
//!
//! - Vehicle: JSON string at `<prefix>:vehicle:<reg_no>`, written with `SET NX` so the first
//!   writer wins
//! - Vehicle classes: hash `<prefix>:vehicle-classes`, bumped in the same script as the `SET NX`
//! - Region: hash `<prefix>:region:<name>` holding name, state, city and the three counters
//! - Region membership: set `<prefix>:region-members:<name>`, insertion order kept in list
//!   `<prefix>:region-numbers:<name>`
//! - Region sensor readings: list `<prefix>:region-ppm:<name>` of JSON readings
//! - All region names: set `<prefix>:regions`
//! - Each key family has its own segment before the name, so no region name (`:` included) can land
//!   on another region's keys
//! - Inserting a vehicle, creating a region and counting a number are Lua scripts, so Redis runs
//!   the check, the push and the increments as one step
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;

use crate::models::{PpmReading, RegionDetail, VehicleClassCount, VehicleRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already holds this `reg_no`.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Counted,
    AlreadyRegistered,
    RegionMissing,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_vehicle(&self, reg_no: &str) -> Result<Option<VehicleRecord>, StoreError>;

    /// Unknown numbers are skipped.
    async fn find_vehicles(&self, reg_nos: &[String]) -> Result<Vec<VehicleRecord>, StoreError>;

    /// Insert only if absent. A successful insert also counts the record's vehicle class.
    async fn insert_vehicle(&self, record: &VehicleRecord) -> Result<InsertOutcome, StoreError>;

    /// Stored vehicles per class, most common first.
    async fn vehicle_classes(&self) -> Result<Vec<VehicleClassCount>, StoreError>;

    async fn find_region(&self, region_name: &str) -> Result<Option<RegionDetail>, StoreError>;

    async fn list_regions(&self) -> Result<Vec<RegionDetail>, StoreError>;

    async fn create_region(&self, region: &RegionDetail) -> Result<CreateOutcome, StoreError>;

    /// Adds `reg_no` to the region and bumps `total_count` plus exactly one of
    /// `valid_count`/`invalid_count`, unless it is already a member. Atomic.
    async fn register_number(
        &self,
        region_name: &str,
        reg_no: &str,
        is_valid: bool,
    ) -> Result<Registration, StoreError>;
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

const INSERT_VEHICLE_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
redis.call('HINCRBY', KEYS[2], ARGV[2], 1)
return 1
"#;

const CREATE_REGION_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'region_name', ARGV[1], 'state', ARGV[2], 'city', ARGV[3],
    'valid_count', 0, 'invalid_count', 0, 'total_count', 0)
redis.call('SADD', KEYS[2], ARGV[1])
return 1
"#;

const REGISTER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
if redis.call('SADD', KEYS[2], ARGV[1]) == 0 then
    return 0
end
redis.call('RPUSH', KEYS[3], ARGV[1])
redis.call('HINCRBY', KEYS[1], 'total_count', 1)
redis.call('HINCRBY', KEYS[1], ARGV[2], 1)
return 1
"#;

pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
    insert_vehicle: Script,
    create_region: Script,
    register: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_redis(redis_url).await?, prefix))
    }

    pub fn new(connection: ConnectionManager, prefix: &str) -> Self {
        Self {
            connection,
            prefix: prefix.to_string(),
            insert_vehicle: Script::new(INSERT_VEHICLE_SCRIPT),
            create_region: Script::new(CREATE_REGION_SCRIPT),
            register: Script::new(REGISTER_SCRIPT),
        }
    }

    fn vehicle_key(&self, reg_no: &str) -> String {
        keyed(&self.prefix, "vehicle", reg_no)
    }

    fn vehicle_classes_key(&self) -> String {
        format!("{}:vehicle-classes", self.prefix)
    }

    fn regions_key(&self) -> String {
        format!("{}:regions", self.prefix)
    }

    fn region_key(&self, region_name: &str) -> String {
        keyed(&self.prefix, "region", region_name)
    }

    fn members_key(&self, region_name: &str) -> String {
        keyed(&self.prefix, "region-members", region_name)
    }

    fn numbers_key(&self, region_name: &str) -> String {
        keyed(&self.prefix, "region-numbers", region_name)
    }

    fn ppm_key(&self, region_name: &str) -> String {
        keyed(&self.prefix, "region-ppm", region_name)
    }
}

fn keyed(prefix: &str, family: &str, name: &str) -> String {
    format!("{prefix}:{family}:{name}")
}

#[async_trait]
impl Store for RedisStore {
    async fn find_vehicle(&self, reg_no: &str) -> Result<Option<VehicleRecord>, StoreError> {
        let key = self.vehicle_key(reg_no);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&key).await?;

        raw.map(|json| decode(&key, &json)).transpose()
    }

    async fn find_vehicles(&self, reg_nos: &[String]) -> Result<Vec<VehicleRecord>, StoreError> {
        if reg_nos.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = reg_nos.iter().map(|n| self.vehicle_key(n)).collect();
        let mut conn = self.connection.clone();

        let raw: Vec<Option<String>> = conn.mget(&keys).await?;

        keys.iter()
            .zip(raw)
            .filter_map(|(key, json)| json.map(|json| decode(key, &json)))
            .collect()
    }

    async fn insert_vehicle(&self, record: &VehicleRecord) -> Result<InsertOutcome, StoreError> {
        let key = self.vehicle_key(&record.reg_no);
        let json = serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let mut conn = self.connection.clone();

        let inserted: i64 = self
            .insert_vehicle
            .key(&key)
            .key(self.vehicle_classes_key())
            .arg(json)
            .arg(record.vehicle_class())
            .invoke_async(&mut conn)
            .await?;

        Ok(if inserted == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Conflict
        })
    }

    async fn vehicle_classes(&self) -> Result<Vec<VehicleClassCount>, StoreError> {
        let key = self.vehicle_classes_key();
        let mut conn = self.connection.clone();

        let fields: HashMap<String, String> = conn.hgetall(&key).await?;

        let counts = fields
            .keys()
            .map(|name| {
                Ok(VehicleClassCount {
                    name: name.clone(),
                    count: counter(&key, &fields, name)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(VehicleClassCount::ranked(counts))
    }

    async fn find_region(&self, region_name: &str) -> Result<Option<RegionDetail>, StoreError> {
        let key = self.region_key(region_name);
        let mut conn = self.connection.clone();

        let (fields, numbers, readings): (HashMap<String, String>, Vec<String>, Vec<String>) =
            redis::pipe()
                .atomic()
                .hgetall(&key)
                .lrange(self.numbers_key(region_name), 0, -1)
                .lrange(self.ppm_key(region_name), 0, -1)
                .query_async(&mut conn)
                .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let ppm_values = readings
            .iter()
            .map(|json| decode::<PpmReading>(&key, json))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RegionDetail {
            region_name: text(&fields, "region_name").unwrap_or(region_name).to_string(),
            state: text(&fields, "state").unwrap_or_default().to_string(),
            city: text(&fields, "city").unwrap_or_default().to_string(),
            valid_count: counter(&key, &fields, "valid_count")?,
            invalid_count: counter(&key, &fields, "invalid_count")?,
            total_count: counter(&key, &fields, "total_count")?,
            registered_numbers: numbers,
            ppm_values,
        }))
    }

    async fn list_regions(&self) -> Result<Vec<RegionDetail>, StoreError> {
        let mut conn = self.connection.clone();

        let mut names: Vec<String> = conn.smembers(self.regions_key()).await?;
        names.sort();

        let mut regions = Vec::with_capacity(names.len());
        for name in names {
            if let Some(region) = self.find_region(&name).await? {
                regions.push(region);
            }
        }

        Ok(regions)
    }

    async fn create_region(&self, region: &RegionDetail) -> Result<CreateOutcome, StoreError> {
        let mut conn = self.connection.clone();

        let created: i64 = self
            .create_region
            .key(self.region_key(&region.region_name))
            .key(self.regions_key())
            .arg(&region.region_name)
            .arg(&region.state)
            .arg(&region.city)
            .invoke_async(&mut conn)
            .await?;

        Ok(if created == 1 {
            CreateOutcome::Created
        } else {
            CreateOutcome::Exists
        })
    }

    async fn register_number(
        &self,
        region_name: &str,
        reg_no: &str,
        is_valid: bool,
    ) -> Result<Registration, StoreError> {
        let counter_field = if is_valid {
            "valid_count"
        } else {
            "invalid_count"
        };
        let mut conn = self.connection.clone();

        let status: i64 = self
            .register
            .key(self.region_key(region_name))
            .key(self.members_key(region_name))
            .key(self.numbers_key(region_name))
            .arg(reg_no)
            .arg(counter_field)
            .invoke_async(&mut conn)
            .await?;

        Ok(match status {
            -1 => Registration::RegionMissing,
            0 => Registration::AlreadyRegistered,
            _ => Registration::Counted,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn text<'a>(fields: &'a HashMap<String, String>, field: &str) -> Option<&'a str> {
    fields.get(field).map(String::as_str)
}

fn counter(key: &str, fields: &HashMap<String, String>, field: &str) -> Result<u64, StoreError> {
    text(fields, field)
        .unwrap_or("0")
        .parse()
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("{field}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use futures_util::future::join_all;
    use serde_json::Value;

    use super::*;

    fn region_keys(prefix: &str, name: &str) -> Vec<String> {
        ["region", "region-members", "region-numbers", "region-ppm"]
            .iter()
            .map(|family| keyed(prefix, family, name))
            .collect()
    }

    #[test]
    fn test_region_keys_never_overlap() {
        let plain = region_keys("puc", "x");
        let nested = region_keys("puc", "x:members");

        assert_eq!(plain[0], "puc:region:x");
        assert_eq!(plain[1], "puc:region-members:x");
        assert!(plain.iter().all(|key| !nested.contains(key)));
        assert!(!nested.contains(&keyed("puc", "vehicle", "x:members")));
    }

    #[test]
    fn test_counter_defaults_and_rejects() {
        let mut fields = HashMap::new();
        fields.insert("total_count".to_string(), "3".to_string());
        fields.insert("valid_count".to_string(), "x".to_string());

        assert_eq!(counter("k", &fields, "total_count").unwrap(), 3);
        assert_eq!(counter("k", &fields, "invalid_count").unwrap(), 0);
        assert!(matches!(
            counter("k", &fields, "valid_count"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_decode_reports_key() {
        let err = decode::<VehicleRecord>("puc:vehicle:X", "{").unwrap_err();

        assert!(err.to_string().contains("puc:vehicle:X"));
    }

    async fn redis_store(name: &str) -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        Some(
            RedisStore::connect(&url, &format!("puc-test-{name}-{nanos}"))
                .await
                .unwrap(),
        )
    }

    async fn cleanup(store: &RedisStore) {
        let mut conn = store.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{}:*", store.prefix)).await.unwrap();

        if !keys.is_empty() {
            let _: () = conn.del(keys).await.unwrap();
        }
    }

    fn vehicle(reg_no: &str, owner: &str, class: &str) -> VehicleRecord {
        VehicleRecord {
            reg_no: reg_no.to_string(),
            owner_name: owner.to_string(),
            model: String::new(),
            state: String::new(),
            reg_type_descr: String::new(),
            vehicle_class_desc: class.to_string(),
            reg_upto: String::new(),
            vehicle_pucc_details: Value::Null,
            checked_on: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_redis_insert_vehicle_conflict() {
        let Some(store) = redis_store("insert").await else {
            return;
        };

        let first = store.insert_vehicle(&vehicle("A1", "first", "Motor Car")).await.unwrap();
        let second = store.insert_vehicle(&vehicle("A1", "second", "Bus")).await.unwrap();
        store.insert_vehicle(&vehicle("B2", "b", "")).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Conflict);
        let stored = store.find_vehicle("A1").await.unwrap().unwrap();
        assert_eq!(stored.owner_name, "first");

        let classes = store.vehicle_classes().await.unwrap();
        let counts: Vec<(&str, u64)> = classes
            .iter()
            .map(|class| (class.name.as_str(), class.count))
            .collect();
        assert_eq!(counts, vec![("Motor Car", 1), ("Unknown", 1)]);

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_redis_create_region_reports_exists() {
        let Some(store) = redis_store("create").await else {
            return;
        };

        let created = store
            .create_region(&RegionDetail::new("pune-east", "MH", "Pune"))
            .await
            .unwrap();
        let again = store
            .create_region(&RegionDetail::new("pune-east", "KA", "Elsewhere"))
            .await
            .unwrap();

        assert_eq!(created, CreateOutcome::Created);
        assert_eq!(again, CreateOutcome::Exists);
        let region = store.find_region("pune-east").await.unwrap().unwrap();
        assert_eq!(region.city, "Pune");
        assert_eq!(region.total_count, 0);
        assert_eq!(store.list_regions().await.unwrap().len(), 1);

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_redis_register_number() {
        let Some(store) = redis_store("register").await else {
            return;
        };

        assert_eq!(
            store.register_number("nowhere", "A1", true).await.unwrap(),
            Registration::RegionMissing
        );
        assert!(store.find_region("nowhere").await.unwrap().is_none());

        store
            .create_region(&RegionDetail::new("x", "MH", "Pune"))
            .await
            .unwrap();
        store
            .create_region(&RegionDetail::new("x:members", "MH", "Pune"))
            .await
            .unwrap();

        assert_eq!(
            store.register_number("x", "A1", true).await.unwrap(),
            Registration::Counted
        );
        assert_eq!(
            store.register_number("x", "A1", false).await.unwrap(),
            Registration::AlreadyRegistered
        );
        assert_eq!(
            store.register_number("x:members", "A1", false).await.unwrap(),
            Registration::Counted
        );

        let region = store.find_region("x").await.unwrap().unwrap();
        assert_eq!(region.valid_count, 1);
        assert_eq!(region.invalid_count, 0);
        assert_eq!(region.total_count, 1);
        assert_eq!(region.registered_numbers, vec!["A1"]);
        let nested = store.find_region("x:members").await.unwrap().unwrap();
        assert_eq!(nested.invalid_count, 1);

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_redis_concurrent_registration() {
        let Some(store) = redis_store("concurrent").await else {
            return;
        };
        store
            .create_region(&RegionDetail::new("pune-east", "MH", "Pune"))
            .await
            .unwrap();

        let plates: Vec<String> = (0..20).map(|n| format!("MH12AB{n:04}")).collect();
        let results = join_all(
            plates
                .iter()
                .chain(plates.iter())
                .enumerate()
                .map(|(n, plate)| store.register_number("pune-east", plate, n % 3 != 0)),
        )
        .await;

        let counted = results
            .into_iter()
            .map(Result::unwrap)
            .filter(|r| *r == Registration::Counted)
            .count();
        assert_eq!(counted, 20);

        let region = store.find_region("pune-east").await.unwrap().unwrap();
        assert_eq!(region.total_count, 20);
        assert_eq!(region.valid_count + region.invalid_count, 20);
        assert_eq!(region.registered_numbers.len(), 20);

        cleanup(&store).await;
    }
}
