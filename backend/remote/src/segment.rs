use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use tracing::{info, warn};

use crate::{
    RemoteError, archive, http_client,
    models::{ExtractedSubImage, RawImage},
};

const SERVICE: &str = "segmentation model";
const UPLOAD_FIELD: &str = "file";
const UPLOAD_NAME: &str = "uploaded_image.jpg";
const ZIP_CONTENT_TYPE: &str = "application/zip";

#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Consumes the photo; it is not needed once the model has answered.
    async fn segment(&self, image: RawImage) -> Result<Vec<ExtractedSubImage>, RemoteError>;
}

pub struct SegmentationClient {
    client: Client,
    url: String,
}

impl SegmentationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Segmenter for SegmentationClient {
    async fn segment(&self, image: RawImage) -> Result<Vec<ExtractedSubImage>, RemoteError> {
        info!("Sending file to segmentation model...");

        let RawImage { buffer, mime_type } = image;
        let part = Part::bytes(buffer)
            .file_name(UPLOAD_NAME)
            .mime_str(&mime_type)
            .map_err(|e| RemoteError::format(SERVICE, e))?;

        let response = self
            .client
            .post(&self.url)
            .multipart(Form::new().part(UPLOAD_FIELD, part))
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Segmentation model answered {status}: {body}");

            return Err(RemoteError::upstream(SERVICE, format!("{status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.contains(ZIP_CONTENT_TYPE) {
            return Err(RemoteError::format(
                SERVICE,
                format!("expected a ZIP file, got '{content_type}'"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e))?;

        let images = tokio::task::spawn_blocking(move || archive::extract(&bytes))
            .await
            .map_err(|e| RemoteError::Io(std::io::Error::other(e)))??;

        info!("Successfully extracted {} files", images.len());

        Ok(images)
    }
}
