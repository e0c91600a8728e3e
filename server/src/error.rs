use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facesrec_coordinator::CoordinatorError;
use serde_json::json;

/// Maps `CoordinatorError` (and the handful of request-shape errors the
/// HTTP layer itself can produce, e.g. bad base64) onto HTTP status
/// codes: one `{"error": ...}` JSON body, never leaking internal detail
/// for `Internal`.
#[derive(Debug)]
pub enum ApiError {
    Coordinator(CoordinatorError),
    Batch(facesrec_batch::BatchError),
    InvalidRequest(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        ApiError::Coordinator(e)
    }
}

impl From<facesrec_batch::BatchError> for ApiError {
    fn from(e: facesrec_batch::BatchError) -> Self {
        ApiError::Batch(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Batch(e) => match e {
                facesrec_batch::BatchError::InvalidBatchSize { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
                facesrec_batch::BatchError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
            },
            ApiError::Coordinator(e) => match e {
                CoordinatorError::InvalidImage => (StatusCode::BAD_REQUEST, e.to_string()),
                CoordinatorError::NoFace => (StatusCode::BAD_REQUEST, e.to_string()),
                CoordinatorError::FaceTooSmall => (StatusCode::BAD_REQUEST, e.to_string()),
                CoordinatorError::FaceTooLarge => (StatusCode::BAD_REQUEST, e.to_string()),
                CoordinatorError::LowQuality => (StatusCode::BAD_REQUEST, e.to_string()),
                CoordinatorError::Duplicate(_) => (StatusCode::CONFLICT, e.to_string()),
                CoordinatorError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                CoordinatorError::CapacityExceeded => (StatusCode::INSUFFICIENT_STORAGE, e.to_string()),
                CoordinatorError::NotInitialized => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
                CoordinatorError::Timeout => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
                CoordinatorError::Internal(detail) => {
                    tracing::error!(error = %detail, "internal error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
                }
            },
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The one case where "no match" is a successful outcome, not an error:
/// `POST /recognition/recognize` returns 404 with this same envelope shape
/// rather than going through `ApiError`.
pub fn not_found(message: impl Into<String>) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message.into() }))).into_response()
}
