use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facerec_core::MatchError;
use facerec_store::StoreError;
use serde_json::json;

use crate::engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

pub const NO_FACE_MESSAGE: &str = "No face detected in the image";

/// Errors a face endpoint can return.
///
/// Only `NoFaceDetected` is the caller's fault; everything else is a 500
/// carrying the error text.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No face detected in the image")]
    NoFaceDetected,

    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("expected a multipart/form-data upload: {0}")]
    Upload(#[from] MultipartRejection),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFaceDetected => StatusCode::BAD_REQUEST,
            ApiError::MissingField(_)
            | ApiError::Multipart(_)
            | ApiError::Upload(_)
            | ApiError::Timeout(_)
            | ApiError::Engine(_)
            | ApiError::Store(_)
            | ApiError::Match(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
