use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use remote::{OcrConfig, RtoConfig};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub redis_prefix: String,
    pub segment_url: String,
    pub segment_timeout_ms: u64,
    pub ocr_url: String,
    pub ocr_host: String,
    pub ocr_api_key: Option<String>,
    pub ocr_timeout_ms: u64,
    pub rto_url: String,
    pub rto_host: String,
    pub rto_api_key: Option<String>,
    pub rto_timeout_ms: u64,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            store_backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_prefix: "puc".to_string(),
            segment_url: "http://127.0.0.1:8000/predict".to_string(),
            segment_timeout_ms: 30_000,
            ocr_url: "https://ocr43.p.rapidapi.com/v1/results".to_string(),
            ocr_host: "ocr43.p.rapidapi.com".to_string(),
            ocr_api_key: None,
            ocr_timeout_ms: 15_000,
            rto_url: "https://rto-vehicle-information-verification-india.p.rapidapi.com/api/v1/rc/vehicleinfo".to_string(),
            rto_host: "rto-vehicle-information-verification-india.p.rapidapi.com".to_string(),
            rto_api_key: None,
            rto_timeout_ms: 15_000,
            max_upload_bytes: 5 * 1024 * 1024,
            cors_origin: "http://localhost:3000".to_string(),
            broadcast_capacity: 64,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();

        Self {
            port: try_load("RUST_PORT", defaults.port),
            store_backend: try_load("STORE_BACKEND", defaults.store_backend),
            redis_url: try_load("REDIS_URL", defaults.redis_url),
            redis_prefix: try_load("REDIS_PREFIX", defaults.redis_prefix),
            segment_url: try_load("SEGMENT_URL", defaults.segment_url),
            segment_timeout_ms: try_load("SEGMENT_TIMEOUT_MS", defaults.segment_timeout_ms),
            ocr_url: try_load("OCR_URL", defaults.ocr_url),
            ocr_host: try_load("OCR_HOST", defaults.ocr_host),
            ocr_api_key: read_secret("OCR_API_KEY"),
            ocr_timeout_ms: try_load("OCR_TIMEOUT_MS", defaults.ocr_timeout_ms),
            rto_url: try_load("RTO_URL", defaults.rto_url),
            rto_host: try_load("RTO_HOST", defaults.rto_host),
            rto_api_key: read_secret("RTO_API_KEY"),
            rto_timeout_ms: try_load("RTO_TIMEOUT_MS", defaults.rto_timeout_ms),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            cors_origin: try_load("CORS_ORIGIN", defaults.cors_origin),
            broadcast_capacity: try_load("BROADCAST_CAPACITY", defaults.broadcast_capacity),
        }
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_timeout_ms)
    }

    pub fn ocr(&self) -> OcrConfig {
        OcrConfig {
            url: self.ocr_url.clone(),
            host: self.ocr_host.clone(),
            api_key: self.ocr_api_key.clone(),
            timeout: Duration::from_millis(self.ocr_timeout_ms),
        }
    }

    pub fn rto(&self) -> RtoConfig {
        RtoConfig {
            url: self.rto_url.clone(),
            host: self.rto_host.clone(),
            api_key: self.rto_api_key.clone(),
            timeout: Duration::from_millis(self.rto_timeout_ms),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> T
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Credentials come from the environment or a mounted `/run/secrets` file. Missing ones are not
/// fatal at boot; the client that needs them reports a configuration error per request.
fn read_secret(secret_name: &str) -> Option<String> {
    if let Ok(value) = env::var(secret_name) {
        return Some(value.trim().to_string()).filter(|v| !v.is_empty());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("redis".parse::<StoreBackend>(), Ok(StoreBackend::Redis));
        assert_eq!(" Memory ".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("RUST_PORT", "8080"), 8080);
        assert_eq!(
            parse_value::<StoreBackend>("STORE_BACKEND", "memory"),
            StoreBackend::Memory
        );
    }

    #[test]
    #[should_panic(expected = "Environment misconfigured!")]
    fn test_parse_value_rejects_garbage() {
        parse_value::<u16>("RUST_PORT", "eighty");
    }

    #[test]
    fn test_remote_configs_carry_timeouts() {
        let config = Config {
            ocr_timeout_ms: 250,
            rto_api_key: Some("key".to_string()),
            ..Config::default()
        };

        assert_eq!(config.ocr().timeout, Duration::from_millis(250));
        assert_eq!(config.ocr().api_key, None);
        assert_eq!(config.rto().api_key.as_deref(), Some("key"));
        assert_eq!(config.segment_timeout(), Duration::from_secs(30));
    }
}
