//! # Batch Processing
//!
//! Pushes local photos through the same pipeline the upload route uses, one at a time, and reports
//! per file. A failing file does not stop the batch.
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use remote::RawImage;
use serde_json::{Value, json};
use tracing::warn;

use server::state::State;

pub fn media_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub async fn load_image(path: &Path) -> anyhow::Result<RawImage> {
    let buffer = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(RawImage::new(buffer, media_type(path)))
}

pub async fn process_images(state: &State, paths: &[PathBuf], region: Option<&str>) -> Vec<Value> {
    let pb = ProgressBar::new(paths.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        pb.set_message(format!("Checking {}", path.display()));
        reports.push(process_image(state, path, region).await);
        pb.inc(1);
    }

    pb.finish_with_message("Done");
    reports
}

async fn process_image(state: &State, path: &Path, region: Option<&str>) -> Value {
    let file = path.display().to_string();

    let image = match load_image(path).await {
        Ok(image) => image,
        Err(err) => {
            warn!("{err:#}");
            return json!({ "file": file, "status": "failed", "error": format!("{err:#}") });
        }
    };

    match state.pipeline.run(Some(image), region).await {
        Ok(report) => json!({ "file": file, "status": "success", "report": report }),
        Err(err) => {
            warn!(file = %file, stage = %err.stage(), "{err}");
            json!({ "file": file, "status": "failed", "error": err.to_string() })
        }
    }
}
