//! Error types and error codes for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::upstream::UpstreamError;

/// Error codes returned by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Backend refused the connection or sent no response
    UpstreamUnavailable,
    /// Backend answered with a non-2xx status
    UpstreamHttpError,
    /// Backend did not answer in time
    Timeout,
    /// Invalid request parameters or body
    InvalidRequest,
    /// Unknown/internal error
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::UpstreamUnavailable => write!(f, "UPSTREAM_UNAVAILABLE"),
            ErrorCode::UpstreamHttpError => write!(f, "UPSTREAM_HTTP_ERROR"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Standard error response: `{ error, code, ...extra }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    /// Route-specific diagnostic fields, e.g. an empty result list
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            error: error.into(),
            code,
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

/// Gateway error with HTTP status code
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ProxyError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            status,
            response: ErrorResponse::new(error, code),
        }
    }

    pub fn unavailable(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message, ErrorCode::UpstreamUnavailable)
    }

    pub fn upstream_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message, ErrorCode::UpstreamHttpError)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, ErrorCode::InvalidRequest)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            ErrorCode::Unknown,
        )
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.response = self.response.with_field(name, value);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.response.code
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.response.code, self.response.error)
    }
}

impl std::error::Error for ProxyError {}

/// Classify reqwest errors into upstream error kinds
pub fn classify_reqwest_error(err: &reqwest::Error) -> UpstreamError {
    let message = err.to_string();

    if err.is_timeout() {
        UpstreamError::Timeout(message)
    } else if err.is_connect() {
        UpstreamError::Unavailable(format!("Connection error: {}", message))
    } else if err.is_request() {
        // Request never produced a response object
        UpstreamError::Unavailable(format!("Request failed: {}", message))
    } else {
        UpstreamError::Other(message)
    }
}

/// Map an upstream failure onto its error code
pub fn code_for(err: &UpstreamError) -> ErrorCode {
    match err {
        UpstreamError::Unavailable(_) => ErrorCode::UpstreamUnavailable,
        UpstreamError::Timeout(_) => ErrorCode::Timeout,
        UpstreamError::Other(_) => ErrorCode::Unknown,
    }
}
