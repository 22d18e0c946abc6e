use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Filter references a field the entity kind never declared.
    UnknownField(String),
    /// Operator is not in the field's supported set.
    UnsupportedOperator(String),
    /// Operand could not be coerced to the field's kind or cardinality.
    OperandTypeMismatch(String),
    Validation(String),
    NotFound(String),
    /// Path id and body id disagree on update.
    ConflictingIdentifier(String),
    /// Update/patch attempted through the no-id route.
    MissingIdentifier(String),
    /// Transient storage failure; idempotent operations may retry.
    StorageUnavailable(String),
    Storage(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::UnknownField(msg) => write!(f, "Unknown field: {}", msg),
            AppError::UnsupportedOperator(msg) => write!(f, "Unsupported operator: {}", msg),
            AppError::OperandTypeMismatch(msg) => write!(f, "Operand type mismatch: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConflictingIdentifier(msg) => write!(f, "Conflicting identifier: {}", msg),
            AppError::MissingIdentifier(msg) => write!(f, "Missing identifier: {}", msg),
            AppError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::UnknownField(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedOperator(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::OperandTypeMismatch(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ConflictingIdentifier(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MissingIdentifier(msg) => (StatusCode::METHOD_NOT_ALLOWED, msg.clone()),
            AppError::StorageUnavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
