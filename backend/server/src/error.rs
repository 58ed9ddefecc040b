use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use remote::RemoteError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    database::StoreError, pipeline::PipelineError, region::RegionError,
    validation::ValidationError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    MalformedPayload(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Internal error: {0}")]
    InternalError(#[from] StoreError),
}

impl From<RegionError> for AppError {
    fn from(err: RegionError) -> Self {
        match err {
            RegionError::NotFound(_) => AppError::NotFound(err.to_string()),
            RegionError::Store(err) => AppError::InternalError(err),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Pipeline(err) => match err {
                PipelineError::Input(_) => StatusCode::BAD_REQUEST,
                PipelineError::RegionNotFound(_) => StatusCode::NOT_FOUND,
                PipelineError::NoPlateDetected => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Segmentation(remote) | PipelineError::Recognition(remote) => {
                    remote_status(remote)
                }
                PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Validation(err) => match err {
                ValidationError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn remote_status(err: &RemoteError) -> StatusCode {
    match err {
        RemoteError::Upstream { .. } | RemoteError::Format { .. } => StatusCode::BAD_GATEWAY,
        RemoteError::EmptyResult => StatusCode::UNPROCESSABLE_ENTITY,
        RemoteError::Config(_) | RemoteError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self}");
        }

        let message = match status {
            StatusCode::BAD_REQUEST => "Invalid request",
            StatusCode::NOT_FOUND => "Not found",
            StatusCode::UNPROCESSABLE_ENTITY => "Nothing to validate",
            StatusCode::BAD_GATEWAY => "Upstream service failed",
            _ => "Internal server error",
        };

        let body = Json(json!({
            "status": "failed",
            "message": message,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
