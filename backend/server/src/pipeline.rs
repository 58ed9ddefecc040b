//! # Pipeline
//!
//! One uploaded photo in, validated plates out.
//!
//! ```text
//! Received -> Segmenting -> Recognizing -> Extracting -> Validating -> Aggregating -> Completed
//!     \            \                            \
//!      Failed       Failed                       Failed
//! ```
//!
//! - Stages run strictly in order; segmentation finishes before any OCR call starts
//! - Recognition tolerates per-crop failures, only a missing OCR configuration aborts
//! - Candidates are validated concurrently. A failed candidate is broadcast as an error and left
//!   out of the response, its siblings carry on
//! - Aborts are broadcast too, then returned to the caller
use std::{fmt, sync::Arc};

use futures_util::future::join_all;
use remote::{RawImage, Recognizer, RemoteError, Segmenter};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    broadcast::Broadcaster,
    database::{Store, StoreError},
    models::{RegionSnapshot, ValidationOutcome},
    normalize,
    region::{RegionAggregator, RegionError},
    validation::Validator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Segmenting,
    Recognizing,
    Extracting,
    Validating,
    Aggregating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Segmenting => "segmenting",
            Stage::Recognizing => "recognizing",
            Stage::Extracting => "extracting",
            Stage::Validating => "validating",
            Stage::Aggregating => "aggregating",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(#[source] RemoteError),

    #[error("Text recognition unavailable: {0}")]
    Recognition(#[source] RemoteError),

    #[error("No number plate detected in the image")]
    NoPlateDetected,

    #[error("Region {0} not found")]
    RegionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Input(_) | PipelineError::RegionNotFound(_) | PipelineError::Store(_) => {
                Stage::Received
            }
            PipelineError::Segmentation(_) => Stage::Segmenting,
            PipelineError::Recognition(_) => Stage::Recognizing,
            PipelineError::NoPlateDetected => Stage::Extracting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateFailure {
    pub reg_no: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub outcomes: Vec<ValidationOutcome>,
    pub failures: Vec<PlateFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionSnapshot>,
}

pub struct Pipeline {
    segmenter: Arc<dyn Segmenter>,
    recognizer: Arc<dyn Recognizer>,
    validator: Arc<Validator>,
    regions: Arc<RegionAggregator>,
    broadcaster: Arc<dyn Broadcaster>,
    store: Arc<dyn Store>,
}

impl Pipeline {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        recognizer: Arc<dyn Recognizer>,
        validator: Arc<Validator>,
        regions: Arc<RegionAggregator>,
        broadcaster: Arc<dyn Broadcaster>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            segmenter,
            recognizer,
            validator,
            regions,
            broadcaster,
            store,
        }
    }

    pub async fn run(
        &self,
        image: Option<RawImage>,
        region: Option<&str>,
    ) -> Result<PipelineReport, PipelineError> {
        let result = self.run_stages(image, region).await;

        if let Err(err) = &result {
            error!(stage = %err.stage(), "Pipeline failed: {err}");
            self.broadcaster.publish_error(&err.to_string());
        }

        result
    }

    async fn run_stages(
        &self,
        image: Option<RawImage>,
        region: Option<&str>,
    ) -> Result<PipelineReport, PipelineError> {
        let image = image.ok_or_else(|| PipelineError::Input("File not found".to_string()))?;

        if !image.is_image() {
            return Err(PipelineError::Input(
                "Invalid file type. Only images are allowed.".to_string(),
            ));
        }

        if let Some(name) = region {
            if self.store.find_region(name).await?.is_none() {
                return Err(PipelineError::RegionNotFound(name.to_string()));
            }
        }

        info!(stage = %Stage::Segmenting, bytes = image.buffer.len(), "Segmenting upload");
        let crops = self
            .segmenter
            .segment(image)
            .await
            .map_err(PipelineError::Segmentation)?;

        info!(stage = %Stage::Recognizing, crops = crops.len(), "Reading crops");
        let blocks = self
            .recognizer
            .recognize_all(&crops)
            .await
            .map_err(PipelineError::Recognition)?;

        let candidates = normalize::extract(&blocks);
        info!(stage = %Stage::Extracting, ?candidates, "Extracted candidates");

        if candidates.is_empty() {
            return Err(PipelineError::NoPlateDetected);
        }

        info!(stage = %Stage::Validating, count = candidates.len(), "Validating candidates");
        let results = join_all(candidates.iter().map(|plate| self.validator.validate(plate))).await;

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(reg_no = err.reg_no(), "{err}");
                    self.broadcaster.publish_error(&err.to_string());
                    failures.push(PlateFailure {
                        reg_no: err.reg_no().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let region = match region {
            Some(name) => self.aggregate(name, &outcomes, &mut failures).await,
            None => None,
        };

        self.broadcaster.publish_result(&outcomes);
        info!(
            succeeded = outcomes.len(),
            failed = failures.len(),
            "Pipeline completed"
        );

        Ok(PipelineReport {
            outcomes,
            failures,
            region,
        })
    }

    /// Counts each successful outcome in `region_name`. Failures are reported, not fatal.
    async fn aggregate(
        &self,
        region_name: &str,
        outcomes: &[ValidationOutcome],
        failures: &mut Vec<PlateFailure>,
    ) -> Option<RegionSnapshot> {
        let mut latest = None;

        for outcome in outcomes {
            match self.regions.apply(region_name, outcome).await {
                Ok(snapshot) => latest = Some(snapshot),
                Err(err) => {
                    let message = match &err {
                        RegionError::NotFound(_) => format!(
                            "Could not count RC Number {} in region {region_name}: {err}",
                            outcome.reg_no()
                        ),
                        RegionError::Store(_) => err.to_string(),
                    };

                    warn!(stage = %Stage::Aggregating, region = region_name, "{message}");
                    self.broadcaster.publish_error(&message);
                    failures.push(PlateFailure {
                        reg_no: outcome.reg_no().to_string(),
                        error: message,
                    });
                }
            }
        }

        latest
    }
}
