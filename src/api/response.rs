use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::api::error::{ApiError, ApiFailure, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

pub type ApiJson<T> = (StatusCode, Json<ApiEnvelope<T>>);

pub fn success<T>(payload: T) -> ApiJson<T>
where
    T: Serialize,
{
    success_with_status(StatusCode::OK, payload)
}

pub fn success_with_status<T>(status: StatusCode, payload: T) -> ApiJson<T>
where
    T: Serialize,
{
    (
        status,
        Json(ApiEnvelope {
            ok: true,
            data: Some(payload),
            error: None,
        }),
    )
}

pub fn failure(
    status: StatusCode,
    kind: ErrorKind,
    code: impl Into<String>,
    message: impl Into<String>,
    details: Option<Value>,
) -> ApiJson<Value> {
    (
        status,
        Json(ApiEnvelope {
            ok: false,
            data: None,
            error: Some(ApiError::new(kind, code, message, details)),
        }),
    )
}

impl From<ApiFailure> for ApiJson<Value> {
    fn from(value: ApiFailure) -> Self {
        (
            value.status,
            Json(ApiEnvelope {
                ok: false,
                data: None,
                error: Some(value.error),
            }),
        )
    }
}

pub fn internal_error(message: impl Into<String>) -> ApiJson<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Infra,
        "internal_error",
        "Internal server error",
        None,
    )
}

/// Serializes `payload` into a uniform `Value` envelope so every handler
/// shares one return type.
pub fn respond<T>(status: StatusCode, payload: T) -> ApiJson<Value>
where
    T: Serialize,
{
    match serde_json::to_value(payload) {
        Ok(value) => success_with_status(status, value),
        Err(e) => internal_error(format!("response serialization failed: {e}")),
    }
}

pub fn respond_result<T>(result: Result<T, ApiFailure>) -> ApiJson<Value>
where
    T: Serialize,
{
    match result {
        Ok(payload) => respond(StatusCode::OK, payload),
        Err(failure) => failure.into(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn failures_carry_kind_code_and_message() {
        let (status, payload) = ApiJson::<Value>::from(ApiFailure::bad_request("invalid_value", "bad"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let value = serde_json::to_value(&payload.0).expect("envelope json");
        assert_eq!(
            value,
            json!({ "ok": false, "error": { "kind": "validation", "code": "invalid_value", "message": "bad" } })
        );
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let (status, payload) = internal_error("sensitive detail");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = payload.0.error.expect("error body");
        assert_eq!(error.message, "Internal server error");
        assert_eq!(error.kind, ErrorKind::Infra);
    }
}
