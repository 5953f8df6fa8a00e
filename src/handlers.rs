//! HTTP route handlers for the gateway

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{Redirect, Response},
    Json,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use url::Url;

use crate::{
    config::Config,
    error::ProxyError,
    image_url::resolve_product_image_url,
    models::{HealthResponse, ImageQuery, ResolvedImage},
    proxy::{self, InboundRequest},
    routes::RouteSpec,
    upstream::{sanitize_url_for_logging, Upstream},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(config: Config, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(sanitize_url_for_logging(
        &state.config.backend_url,
    )))
}

/// Any proxied API route: forward to the backend per the route's table row
pub async fn proxy_handler(
    route: &'static RouteSpec,
    state: AppState,
    path_params: HashMap<String, String>,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let inbound = InboundRequest {
        path_params,
        query,
        headers,
        body,
    };

    proxy::execute(route, state.upstream.as_ref(), &state.config, inbound).await
}

/// GET /api/v1/images/resolve?src= - Resolve an image source to its display URL
pub async fn resolve_image_handler(Query(query): Query<ImageQuery>) -> Json<ResolvedImage> {
    Json(ResolvedImage {
        url: resolve_product_image_url(query.src.as_deref()),
    })
}

/// GET /api/v1/images?src= - Redirect to the resolved image URL
pub async fn image_redirect_handler(
    Query(query): Query<ImageQuery>,
) -> Result<Redirect, ProxyError> {
    let resolved = resolve_product_image_url(query.src.as_deref())
        .ok_or_else(|| ProxyError::invalid_request("src is required"))?;

    let is_web_url = Url::parse(&resolved)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !is_web_url {
        return Err(ProxyError::invalid_request(
            "src must be an absolute http or https URL",
        ));
    }

    debug!(target_url = %resolved, "Redirecting image request");
    Ok(Redirect::temporary(&resolved))
}
