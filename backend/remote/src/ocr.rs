use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use tracing::{info, warn};

use crate::{
    RemoteError, http_client,
    models::{ExtractedSubImage, OcrResponse, OcrTextBlock},
};

const SERVICE: &str = "OCR service";
const UPLOAD_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub url: String,
    pub host: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// `None` when this sub-image yields no text for any reason.
    async fn recognize(&self, image: &ExtractedSubImage) -> Option<OcrTextBlock>;

    /// One entry per sub-image, in the same order. Only a missing transport fails the batch.
    async fn recognize_all(
        &self,
        images: &[ExtractedSubImage],
    ) -> Result<Vec<Option<OcrTextBlock>>, RemoteError> {
        Ok(join_all(images.iter().map(|image| self.recognize(image))).await)
    }
}

pub struct OcrClient {
    client: Client,
    url: String,
    host: String,
    api_key: Option<String>,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: http_client(SERVICE, config.timeout)?,
            url: config.url,
            host: config.host,
            api_key: config.api_key,
        })
    }

    async fn request(
        &self,
        image: &ExtractedSubImage,
        api_key: &str,
    ) -> Result<Option<OcrTextBlock>, RemoteError> {
        let part = Part::bytes(image.buffer.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| RemoteError::format(SERVICE, e))?;

        let response = self
            .client
            .post(&self.url)
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", &self.host)
            .multipart(Form::new().part(UPLOAD_FIELD, part))
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::upstream(SERVICE, format!("{status}: {body}")));
        }

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        let texts: Vec<&str> = body.texts().collect();
        if texts.is_empty() {
            return Ok(None);
        }

        Ok(Some(texts.join("\n")))
    }
}

#[async_trait]
impl Recognizer for OcrClient {
    async fn recognize(&self, image: &ExtractedSubImage) -> Option<OcrTextBlock> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("OCR API key missing, skipping {}", image.filename);
            return None;
        };

        info!("Processing OCR for file: {} ({})", image.filename, image.mime_type);

        match self.request(image, api_key).await {
            Ok(Some(text)) => {
                info!("Extracted text from {}: {text:?}", image.filename);
                Some(text)
            }
            Ok(None) => {
                warn!("No text entities found in OCR response for {}", image.filename);
                None
            }
            Err(e) => {
                warn!("Error in OCR processing for file {}: {e}", image.filename);
                None
            }
        }
    }

    async fn recognize_all(
        &self,
        images: &[ExtractedSubImage],
    ) -> Result<Vec<Option<OcrTextBlock>>, RemoteError> {
        if self.api_key.is_none() {
            return Err(RemoteError::Config("OCR API key"));
        }

        let blocks: Vec<Option<OcrTextBlock>> =
            join_all(images.iter().map(|image| self.recognize(image))).await;

        if blocks.iter().all(Option::is_none) {
            warn!("No text was successfully extracted from any of the images");
        }

        Ok(blocks)
    }
}
