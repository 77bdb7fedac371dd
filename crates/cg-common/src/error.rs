use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Convenient Result alias.
pub type AppResult<T> = Result<T, AppError>;

/// Per-field error messages, keyed by field name or `general`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Message shown for every internal failure. Details stay in the logs.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Wire-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    BadRequest,
    NotFound,
    ValidationFailed,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify an error status that arrived without a report.
    /// Anything outside the taxonomy is `Internal`.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::BAD_REQUEST
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UPGRADE_REQUIRED => Self::BadRequest,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => Self::NotFound,
            StatusCode::UNPROCESSABLE_ENTITY => Self::ValidationFailed,
            _ => Self::Internal,
        }
    }

    fn field(self) -> &'static str {
        match self {
            Self::Unauthorized => "token",
            Self::Forbidden => "origin",
            Self::BadRequest => "body",
            Self::NotFound | Self::ValidationFailed | Self::Internal => "general",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::Unauthorized => "is missing",
            Self::Forbidden => "is not allowed",
            Self::BadRequest => "could not be parsed",
            Self::NotFound => "resource not found",
            Self::ValidationFailed => "is invalid",
            Self::Internal => INTERNAL_MESSAGE,
        }
    }
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Reduce to the wire-safe report. Internal causes are kept only in `detail`.
    pub fn report(&self) -> ErrorReport {
        let kind = self.kind();
        let errors = match self {
            Self::Validation(errors) => errors.clone(),
            Self::Database(_) | Self::Internal(_) => single(kind.field(), INTERNAL_MESSAGE),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg) => single(kind.field(), msg),
        };

        ErrorReport {
            kind,
            errors,
            detail: self.to_string(),
        }
    }
}

fn single(field: &str, message: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), vec![message.to_string()]);
    errors
}

/// An error captured on its way out of a handler or stage, waiting to be
/// rendered by the normalization step.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub errors: FieldErrors,
    /// Log-only description; never written to the response.
    pub detail: String,
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub errors: FieldErrors,
}

impl ErrorReport {
    /// Report for an error status produced without an `AppError`
    /// (framework rejections, unmatched methods).
    pub fn from_status(status: StatusCode) -> Self {
        let kind = ErrorKind::from_status(status);
        Self {
            kind,
            errors: single(kind.field(), kind.default_message()),
            detail: format!("unreported {status} response"),
        }
    }

    /// Build the wire response. `Forbidden` carries no body.
    pub fn render(self) -> Response {
        let status = self.kind.status_code();
        if self.kind == ErrorKind::Forbidden {
            return status.into_response();
        }
        (status, axum::Json(ErrorBody { errors: self.errors })).into_response()
    }
}

impl IntoResponse for AppError {
    /// Captures the error instead of rendering it; the status is set so
    /// layers outside the pipeline still see a failure.
    fn into_response(self) -> Response {
        let report = self.report();
        let mut response = report.kind.status_code().into_response();
        response.extensions_mut().insert(report);
        response
    }
}
