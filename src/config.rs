//! Configuration module for environment variables

use std::{env, str::FromStr};

/// Gateway configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,
    /// Log level (default: info)
    pub log_level: String,
    /// Backend API base URL, route paths are appended to it
    pub backend_url: String,
    /// Default upstream timeout in seconds (default: 10)
    pub upstream_timeout: u64,
    /// Upstream timeout for AI/recommendation/chat routes in seconds (default: 20)
    pub extended_upstream_timeout: u64,
    /// Server request timeout in seconds (default: 60)
    pub server_timeout: u64,
    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,
    /// Cookie carrying the session access token
    pub session_cookie: String,
    /// Cookie carrying the session expiry as unix seconds
    pub session_expiry_cookie: String,
    /// Origins allowed by the CORS layer
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 8080),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            backend_url: env::var("BACKEND_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8000/api/v1".to_string()),
            upstream_timeout: parse_var("UPSTREAM_TIMEOUT", 10),
            extended_upstream_timeout: parse_var("EXTENDED_UPSTREAM_TIMEOUT", 20),
            server_timeout: parse_var("SERVER_TIMEOUT", 60),
            max_request_body_size: parse_var("MAX_REQUEST_BODY_SIZE", 1024 * 1024), // 1MB
            session_cookie: env::var("SESSION_COOKIE")
                .unwrap_or_else(|_| "access_token".to_string()),
            session_expiry_cookie: env::var("SESSION_EXPIRY_COOKIE")
                .unwrap_or_else(|_| "access_token_expires".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
