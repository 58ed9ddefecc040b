use axum::extract::Multipart;
use remote::RawImage;

use crate::error::AppError;

pub const FILE_FIELD: &str = "file";
pub const REGION_FIELD: &str = "regionName";

/// Room for multipart boundaries and the text fields on top of the file itself.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct Upload {
    pub image: Option<RawImage>,
    pub region: Option<String>,
}

/// Pulls the photo and optional region name out of the form. Missing or mistyped files are left
/// for the pipeline to reject; only oversized or unreadable bodies fail here.
pub async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> Result<Upload, AppError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedPayload(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        match name.as_str() {
            FILE_FIELD => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::MalformedPayload(e.body_text()))?;

                if bytes.len() > max_bytes {
                    return Err(AppError::MalformedPayload(format!(
                        "File too large. Maximum size is {max_bytes} bytes."
                    )));
                }

                upload.image = Some(RawImage::new(bytes.to_vec(), content_type));
            }
            REGION_FIELD => {
                let region = field
                    .text()
                    .await
                    .map_err(|e| AppError::MalformedPayload(e.body_text()))?;
                let region = region.trim();

                if !region.is_empty() {
                    upload.region = Some(region.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}
