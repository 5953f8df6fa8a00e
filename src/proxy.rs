//! Shared proxy engine
//!
//! Runs one [`RouteSpec`] for one inbound request: validate, build the
//! backend call, forward it once, and map the outcome onto a response.
//! Every failure ends up as a JSON error body; nothing escapes to the caller.

use axum::{
    body::Bytes,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::{collections::HashMap, time::Duration, time::Instant};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::{
    auth::authorization_for,
    config::Config,
    error::{code_for, ProxyError},
    routes::{AuthPolicy, NotFoundFallback, QueryPolicy, RouteSpec, TimeoutClass, Verb},
    upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse},
};

/// The parts of an inbound request the engine looks at
#[derive(Debug, Default)]
pub struct InboundRequest {
    pub path_params: HashMap<String, String>,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forward `inbound` according to `route`
pub async fn execute(
    route: &RouteSpec,
    upstream: &dyn Upstream,
    config: &Config,
    inbound: InboundRequest,
) -> Result<Response, ProxyError> {
    let body = outbound_body(route, &inbound.body)?;

    let request = UpstreamRequest {
        method: route.verb.method(),
        path: route.upstream_path(&inbound.path_params),
        query: outbound_query(&route.query, inbound.query.as_deref()),
        authorization: match route.auth {
            AuthPolicy::Forward => authorization_for(&inbound.headers, config),
            AuthPolicy::None => None,
        },
        body,
        timeout: match route.timeout {
            TimeoutClass::Extended => Some(Duration::from_secs(config.extended_upstream_timeout)),
            TimeoutClass::Default => None,
        },
    };

    debug!(
        route = route.name,
        method = %request.method,
        path = %request.path,
        authorized = request.authorization.is_some(),
        "Forwarding request"
    );

    let start = Instant::now();
    let response = upstream.send(request).await.map_err(|e| {
        let err = transport_failure(route, &e);
        warn!(route = route.name, error = %e, code = %err.code(), "Backend call failed");
        err
    })?;
    let elapsed = start.elapsed().as_millis() as u64;

    info!(
        route = route.name,
        status = response.status.as_u16(),
        elapsed_ms = elapsed,
        "Backend responded"
    );

    if response.status.is_success() {
        return Ok(pass_through(response));
    }

    if response.status == StatusCode::NOT_FOUND {
        match route.not_found {
            Some(NotFoundFallback::EmptyList) => {
                return Ok((StatusCode::OK, Json(json!([]))).into_response());
            }
            Some(NotFoundFallback::Message(message)) => {
                return Err(ProxyError::upstream_status(StatusCode::NOT_FOUND, message));
            }
            None => {}
        }
    }

    Err(with_empty_field(
        route,
        ProxyError::upstream_status(
            response.status,
            upstream_message(&response.body).unwrap_or_else(|| route.error_message.to_string()),
        ),
    ))
}

/// Re-serialize only the recognized query parameters, applying defaults
pub fn outbound_query(policy: &QueryPolicy, raw: Option<&str>) -> Vec<(String, String)> {
    let inbound: Vec<(String, String)> = raw
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    match policy {
        QueryPolicy::PassThrough => inbound,
        QueryPolicy::Declared(rules) => rules
            .iter()
            .filter_map(|rule| {
                let value = inbound
                    .iter()
                    .find(|(key, value)| key == rule.name && !value.is_empty())
                    .map(|(_, value)| value.clone())
                    .or_else(|| rule.default.map(str::to_string))?;
                Some((rule.upstream.to_string(), value))
            })
            .collect(),
    }
}

/// Parse and validate the JSON body of write routes
fn outbound_body(route: &RouteSpec, raw: &Bytes) -> Result<Option<Value>, ProxyError> {
    if route.verb != Verb::Post {
        return Ok(None);
    }

    let body: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(raw)
            .map_err(|_| ProxyError::invalid_request("Request body must be valid JSON"))?
    };

    if let Some(missing) = route
        .required_body
        .iter()
        .find(|field| !has_value(&body, field))
    {
        return Err(ProxyError::invalid_request(format!("{} is required", missing)));
    }

    Ok(Some(body))
}

fn has_value(body: &Value, field: &str) -> bool {
    match body.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn pass_through(response: UpstreamResponse) -> Response {
    let content_type = response
        .content_type
        .unwrap_or_else(|| "application/json".to_string());

    (
        response.status,
        [(header::CONTENT_TYPE, content_type)],
        response.body,
    )
        .into_response()
}

/// No response came back: unreachable, timed out, or broken mid-flight
fn transport_failure(route: &RouteSpec, err: &UpstreamError) -> ProxyError {
    let mut proxy_err = match (err, route.unavailable) {
        (UpstreamError::Unavailable(_) | UpstreamError::Timeout(_), Some(message)) => {
            ProxyError::unavailable(StatusCode::SERVICE_UNAVAILABLE, message)
        }
        _ => ProxyError::unknown(route.error_message),
    };
    proxy_err.response.code = code_for(err);
    with_empty_field(route, proxy_err)
}

fn with_empty_field(route: &RouteSpec, err: ProxyError) -> ProxyError {
    match route.empty_on_error {
        Some(field) => err.with_field(field, json!([])),
        None => err,
    }
}

/// Error text from a backend error body (`detail` or `error`)
fn upstream_message(body: &Bytes) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}
