//! Error handling

use std::time::Duration;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::logic::model::BackendError;
use crate::logic::sequence::ValidationError;
use crate::logic::service::ServiceError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Client input errors
    Validation(ValidationError),
    MalformedRequest(String),
    PayloadTooLarge(String),

    // Backend errors
    Backend(BackendError),
    Timeout(Duration),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::SequenceTooLong { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Backend(BackendError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            AppError::Backend(BackendError::Worker(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(e) => e.code(),
            AppError::MalformedRequest(_) => "malformed_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Backend(e) => e.code(),
            AppError::Timeout(_) => "timeout",
        }
    }

    /// Client-facing message; backend details stay in the logs
    fn message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::MalformedRequest(msg) | AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::Backend(BackendError::EmbeddingUnavailable(_)) => {
                "Embedding model unavailable, try again later".to_string()
            }
            AppError::Backend(BackendError::ClassifierUnavailable(_)) => {
                "Classifier unavailable, try again later".to_string()
            }
            AppError::Backend(BackendError::Upstream(_)) => "Upstream predictor error".to_string(),
            AppError::Backend(BackendError::Worker(_)) => "Internal server error".to_string(),
            AppError::Timeout(deadline) => {
                format!("Processing exceeded {}ms deadline", deadline.as_millis())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::Backend(e) = &self {
            tracing::error!("Backend error: {}", e);
        }

        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::Validation(e),
            ServiceError::Backend(e) => AppError::Backend(e),
            ServiceError::Timeout(deadline) => AppError::Timeout(deadline),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::MalformedRequest(rejection.body_text())
        }
    }
}
