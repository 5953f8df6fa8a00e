//! Request and Response models for the gateway API

use serde::{Deserialize, Serialize};

/// Query string of the image endpoints
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    /// Raw image source as stored on the product
    #[serde(default)]
    pub src: Option<String>,
}

/// Result of resolving an image source
#[derive(Debug, Serialize)]
pub struct ResolvedImage {
    /// Displayable URL, `null` when the source was absent or empty
    pub url: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,

    /// Service version
    pub version: &'static str,

    /// Backend base URL requests are forwarded to
    pub backend: String,
}

impl HealthResponse {
    pub fn new(backend: String) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            backend,
        }
    }
}
