use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::session::error::{CommitError, ValidationError};
use crate::storage::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Provider,
    Infra,
    Policy,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

/// An [`ApiError`] paired with the status it is sent under.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiFailure {
    pub fn new(status: StatusCode, kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiError::new(kind, code, message, None),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::Validation, code, message)
    }
}

impl From<ValidationError> for ApiFailure {
    fn from(error: ValidationError) -> Self {
        Self::bad_request(error.code(), error.to_string())
    }
}

impl From<CommitError> for ApiFailure {
    fn from(error: CommitError) -> Self {
        let code = error.code();
        let message = error.to_string();
        match error {
            CommitError::Validation(inner) => inner.into(),
            CommitError::SessionBusy | CommitError::StaleTicket(_) => {
                Self::new(StatusCode::CONFLICT, ErrorKind::Policy, code, message)
            }
            CommitError::Canceled { completed_steps } => {
                Self::new(StatusCode::CONFLICT, ErrorKind::Policy, code, message)
                    .with_details(json!({ "completed_steps": completed_steps }))
            }
            CommitError::TransformStepFailed { step, cause } => {
                Self::new(StatusCode::BAD_GATEWAY, ErrorKind::Provider, code, message).with_details(json!({
                    "step": step,
                    "code": cause.code(),
                    "message": cause.message(),
                }))
            }
        }
    }
}

impl From<SourceError> for ApiFailure {
    fn from(error: SourceError) -> Self {
        let message = error.to_string();
        match error {
            SourceError::InvalidUrl { .. } => Self::bad_request("invalid_source_url", message),
            SourceError::Artifact(_) => Self::bad_request("invalid_source_image", message),
            SourceError::Fetch(_) | SourceError::Status { .. } => Self::new(
                StatusCode::BAD_GATEWAY,
                ErrorKind::Provider,
                "source_fetch_failed",
                message,
            ),
        }
    }
}
