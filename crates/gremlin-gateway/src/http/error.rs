//! HTTP error responses.
//!
//! Failures are returned as a bare JSON string, which is what the UI
//! displays. Authentication failures use a `{code, message}` object instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;
use crate::translate::translate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// A failed engine call, prefixed for the UI.
    ///
    /// Validation errors keep their own text. Everything else goes through
    /// the translator; the diagnostic is logged and never returned.
    pub fn query(prefix: &str, err: &GatewayError) -> Self {
        if err.is_validation() {
            return Self::bad_request(err.to_string());
        }
        let translated = translate(err);
        if !translated.diagnostic.is_empty() {
            tracing::debug!(diagnostic = %translated.diagnostic, "gremlin error diagnostic");
        }
        Self::bad_request(format!("{}: {}", prefix, translated.message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status == StatusCode::UNAUTHORIZED {
            let body = json!({"code": self.status.as_u16(), "message": self.message});
            return (self.status, Json(body)).into_response();
        }
        (self.status, Json(self.message)).into_response()
    }
}
