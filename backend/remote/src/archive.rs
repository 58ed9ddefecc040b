//! # Archive
//!
//! Unpacks the segmentation model's ZIP answer into sub-images.
//!
//! The archive is written into a fresh temporary directory and extracted next to it. The directory
//! is owned by a [`TempDir`](tempfile::TempDir) guard, so it is removed on every return path,
//! including the early error returns.
use std::{
    env,
    fs::{self, File},
    path::Path,
};

use tracing::debug;
use zip::ZipArchive;

use crate::{RemoteError, models::ExtractedSubImage};

const SERVICE: &str = "segmentation archive";
const ARCHIVE_NAME: &str = "response.zip";
const EXTRACT_DIR: &str = "extracted";

pub fn extract(bytes: &[u8]) -> Result<Vec<ExtractedSubImage>, RemoteError> {
    extract_in(&env::temp_dir(), bytes)
}

pub fn extract_in(base: &Path, bytes: &[u8]) -> Result<Vec<ExtractedSubImage>, RemoteError> {
    let workspace = tempfile::Builder::new()
        .prefix("extract_")
        .tempdir_in(base)?;

    let zip_path = workspace.path().join(ARCHIVE_NAME);
    fs::write(&zip_path, bytes)?;
    debug!("ZIP file written to {}", zip_path.display());

    let extract_path = workspace.path().join(EXTRACT_DIR);
    fs::create_dir_all(&extract_path)?;

    let mut archive =
        ZipArchive::new(File::open(&zip_path)?).map_err(|e| RemoteError::format(SERVICE, e))?;
    archive
        .extract(&extract_path)
        .map_err(|e| RemoteError::format(SERVICE, e))?;

    let mut entries = fs::read_dir(&extract_path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut images = Vec::new();
    for entry in entries {
        let filename = entry.file_name().to_string_lossy().into_owned();

        // macOS metadata and dotfiles
        if filename.starts_with('.') {
            continue;
        }

        if !entry.file_type()?.is_file() {
            continue;
        }

        let buffer = fs::read(entry.path())?;
        let mime_type = media_type(&filename);

        debug!("Processed file: {filename}");
        images.push(ExtractedSubImage {
            filename,
            buffer,
            mime_type,
        });
    }

    if images.is_empty() {
        return Err(RemoteError::EmptyResult);
    }

    Ok(images)
}

fn media_type(filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" => "image/jpeg".to_string(),
        ext => format!("image/{ext}"),
    }
}
