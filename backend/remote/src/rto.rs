use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::{
    RemoteError, http_client,
    models::{RtoRequest, RtoResponse, RtoResult},
};

const SERVICE: &str = "RTO lookup";

pub const CONSENT: &str = "Y";
pub const CONSENT_TEXT: &str =
    "I hereby declare my consent agreement for fetching my information via AITAN Labs API";

#[derive(Debug, Clone)]
pub struct RtoConfig {
    pub url: String,
    pub host: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[async_trait]
pub trait RtoLookup: Send + Sync {
    /// `Ok(None)` when the service answered but carried no usable result.
    async fn lookup(&self, reg_no: &str) -> Result<Option<RtoResult>, RemoteError>;
}

pub struct RtoClient {
    client: Client,
    url: String,
    host: String,
    api_key: Option<String>,
}

impl RtoClient {
    pub fn new(config: RtoConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: http_client(SERVICE, config.timeout)?,
            url: config.url,
            host: config.host,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl RtoLookup for RtoClient {
    async fn lookup(&self, reg_no: &str) -> Result<Option<RtoResult>, RemoteError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RemoteError::Config("RTO API key"))?;

        info!("Performing external PUC validation for {reg_no}");

        let payload = RtoRequest {
            reg_no,
            consent: CONSENT,
            consent_text: CONSENT_TEXT,
        };

        let response = self
            .client
            .post(&self.url)
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", &self.host)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("RTO lookup for {reg_no} answered {status}: {body}");

            return Err(RemoteError::upstream(SERVICE, format!("{status}: {body}")));
        }

        let body: RtoResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        Ok(body.result)
    }
}
