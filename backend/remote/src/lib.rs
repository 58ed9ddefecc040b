//! # Remote
//!
//! Outbound calls to the third-party services behind the PUC pipeline.
//!
//! - Segmentation model: takes the raw sticker photo, answers with a ZIP of cropped sub-images
//! - OCR service: takes one sub-image, answers with a nested entity graph ending in text leaves
//! - RTO lookup: takes a registration number, answers with the registered vehicle and its PUC details
//!
//! Every client sits behind a trait so the server can swap in fakes. Every client is bounded by
//! its own timeout; a timeout is reported the same way as any other transport failure.
use std::{fmt::Display, time::Duration};

use reqwest::Client;
use thiserror::Error;

pub mod archive;
pub mod models;
pub mod ocr;
pub mod rto;
pub mod segment;

pub use models::{ExtractedSubImage, OcrTextBlock, RawImage, RtoResult};
pub use ocr::{OcrClient, OcrConfig, Recognizer};
pub use rto::{RtoClient, RtoConfig, RtoLookup};
pub use segment::{SegmentationClient, Segmenter};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{service} request failed: {reason}")]
    Upstream {
        service: &'static str,
        reason: String,
    },

    #[error("Unexpected response from {service}: {reason}")]
    Format {
        service: &'static str,
        reason: String,
    },

    #[error("No valid files found in ZIP")]
    EmptyResult,

    #[error("{0} is not configured")]
    Config(&'static str),

    #[error("Extraction storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub(crate) fn upstream(service: &'static str, reason: impl Display) -> Self {
        RemoteError::Upstream {
            service,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn format(service: &'static str, reason: impl Display) -> Self {
        RemoteError::Format {
            service,
            reason: reason.to_string(),
        }
    }

    /// Body decoding problems are the upstream's fault, everything else reqwest reports is transport.
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::format(service, err)
        } else {
            Self::upstream(service, err)
        }
    }
}

pub(crate) fn http_client(service: &'static str, timeout: Duration) -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RemoteError::upstream(service, e))
}
