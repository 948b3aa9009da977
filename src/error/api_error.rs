use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Canonical structured error produced by the error funnel.
///
/// Every failure that reaches a client is expressed as an `ApiError`:
/// an HTTP status, a message, optional structured `errors` detail and an
/// optional stack/diagnostic string that is only rendered in development.
/// `is_public` is false for errors converted from unexpected failures.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Option<Value>,
    pub stack: Option<String>,
    pub is_public: bool,
}

impl ApiError {
    /// Creates an error with the given status and message.
    ///
    /// An empty message falls back to the canonical reason phrase of the status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("Unknown Error").to_string()
        } else {
            message
        };

        Self {
            status,
            message,
            errors: None,
            stack: None,
            is_public: true,
        }
    }

    /// The error synthesized when no stage produced a response.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attaches structured detail (e.g. per-field validation failures).
    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Attaches diagnostic detail, rendered only in development.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Marks the error as raised by an unexpected failure.
    pub fn internal_origin(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Renders the JSON body for this error.
    pub fn to_body(&self, include_stack: bool) -> ErrorBody {
        ErrorBody {
            code: self.status.as_u16(),
            message: self.message.clone(),
            errors: self.errors.clone(),
            stack: if include_stack { self.stack.clone() } else { None },
            request_id: None,
        }
    }
}

/// Routes return `ApiError` directly; the response carries the error in its
/// extensions so the API dispatcher can hand it to the error funnel instead
/// of sending this fallback rendering.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.to_body(false))).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// JSON error body sent to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorBody {
    /// Adds request ID to the error body for correlation.
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_found_error() {
        let error = ApiError::not_found();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Not found");
    }

    #[test]
    fn test_empty_message_uses_reason_phrase() {
        let error = ApiError::new(StatusCode::FORBIDDEN, "");
        assert_eq!(error.message, "Forbidden");
    }

    #[test]
    fn test_body_omits_stack_unless_requested() {
        let error = ApiError::internal("boom").with_stack("at stage");

        let hidden = serde_json::to_value(error.to_body(false)).unwrap();
        assert_eq!(hidden, json!({ "code": 500, "message": "boom" }));

        let shown = serde_json::to_value(error.to_body(true)).unwrap();
        assert_eq!(shown["stack"], "at stage");
    }

    #[test]
    fn test_body_includes_errors_and_request_id() {
        let body = ApiError::bad_request("Validation Error")
            .with_errors(json!([{ "field": "email" }]))
            .to_body(false)
            .with_request_id("req-1");

        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["errors"][0]["field"], "email");
        assert_eq!(value["request_id"], "req-1");
    }

    #[test]
    fn test_into_response_carries_error_extension() {
        let response = ApiError::unauthorized("Unauthorized").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let carried = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(carried.message, "Unauthorized");
    }
}
