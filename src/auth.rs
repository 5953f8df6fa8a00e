//! Authorization header selection for forwarded calls

use axum::http::{header, HeaderMap};
use axum_extra::headers::{Cookie, HeaderMapExt};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;

/// Session read from the local auth context (cookies)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Expiry as unix seconds, when known
    pub expires_at: Option<u64>,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Pick the authorization header for the backend call.
///
/// An inbound `Authorization` header wins. Otherwise a live session cookie
/// becomes a bearer token. Otherwise the header is omitted and the backend
/// decides.
pub fn authorization_for(headers: &HeaderMap, config: &Config) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        return Some(value.to_string());
    }

    let session = session_from_cookies(headers, config)?;
    if session.is_expired(unix_now()) {
        return None;
    }
    Some(format!("Bearer {}", session.access_token))
}

pub fn session_from_cookies(headers: &HeaderMap, config: &Config) -> Option<Session> {
    let cookies = headers.typed_get::<Cookie>()?;
    let access_token = cookie_value(&cookies, &config.session_cookie)
        .filter(|t| !t.is_empty())?
        .to_string();
    let expires_at =
        cookie_value(&cookies, &config.session_expiry_cookie).and_then(|v| v.parse().ok());

    Some(Session {
        access_token,
        expires_at,
    })
}

/// Cookie value with optional surrounding double quotes removed
fn cookie_value<'a>(cookies: &'a Cookie, name: &str) -> Option<&'a str> {
    cookies.get(name).map(|value| {
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
