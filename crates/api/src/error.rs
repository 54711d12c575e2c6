use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ocr::{PollError, UploadError};
use serde::Serialize;
use serde_json::Value;

use crate::metrics::RequestOutcome;

/// Every way a scan request can fail.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Upload(UploadError),
    Poll(PollError),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ApiError {
    pub fn outcome(&self) -> RequestOutcome {
        match self {
            ApiError::BadRequest(_) => RequestOutcome::Rejected,
            ApiError::Upload(_) => RequestOutcome::UploadFailed,
            ApiError::Poll(e) if e.is_timeout() => RequestOutcome::TimedOut,
            ApiError::Poll(_) => RequestOutcome::PollFailed,
            ApiError::Internal(_) => RequestOutcome::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Upload(e) => {
                tracing::error!(error = %e, "Receipt upload failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Upload failed".to_string(),
                    Some(e.details()),
                )
            }
            ApiError::Poll(e) if e.is_timeout() => {
                tracing::error!(error = %e, "Receipt processing timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Processing timed out".to_string(),
                    Some(e.details()),
                )
            }
            ApiError::Poll(e) => {
                tracing::error!(error = %e, "Receipt processing failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Processing failed".to_string(),
                    Some(e.details()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorBody { error, details })).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        ApiError::Upload(e)
    }
}

impl From<PollError> for ApiError {
    fn from(e: PollError) -> Self {
        ApiError::Poll(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {e}"))
    }
}
