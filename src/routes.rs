//! Route table and router assembly
//!
//! Every API route is a [`RouteSpec`] row consumed by the shared proxy engine
//! in [`crate::proxy`]. Adding an endpoint means adding a row here.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method},
    routing::{get, MethodFilter, MethodRouter},
    Router,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::{BTreeMap, HashMap};

use crate::handlers::{
    health_handler, image_redirect_handler, proxy_handler, resolve_image_handler, AppState,
};

/// Versioned prefix for every proxied endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Characters escaped when substituting a value into a path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Delete,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Delete => Method::DELETE,
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Delete => MethodFilter::DELETE,
        }
    }
}

/// One recognized query parameter
#[derive(Debug)]
pub struct ParamRule {
    /// Name the client sends
    pub name: &'static str,
    /// Name the backend expects
    pub upstream: &'static str,
    /// Used when absent; `None` forwards the parameter only when present
    pub default: Option<&'static str>,
}

/// `param!("in" => "out")` or `param!("in" => "out" = "default")`
macro_rules! param {
    ($name:literal => $upstream:literal) => {
        ParamRule {
            name: $name,
            upstream: $upstream,
            default: None,
        }
    };
    ($name:literal => $upstream:literal = $default:literal) => {
        ParamRule {
            name: $name,
            upstream: $upstream,
            default: Some($default),
        }
    };
}

#[derive(Debug)]
pub enum QueryPolicy {
    /// Only the listed parameters are forwarded
    Declared(&'static [ParamRule]),
    /// The inbound query string is forwarded unchanged
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    None,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Client-level upstream timeout
    Default,
    /// Slow AI/recommendation endpoints
    Extended,
}

/// What an optional-feature route answers when the backend returns 404
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundFallback {
    /// 200 with `[]`
    EmptyList,
    /// 404 with the given message
    Message(&'static str),
}

#[derive(Debug)]
pub struct RouteSpec {
    pub name: &'static str,
    pub verb: Verb,
    /// Inbound path below [`API_PREFIX`]
    pub path: &'static str,
    /// Backend path template, `{param}` segments filled from the inbound path
    pub upstream: &'static str,
    pub query: QueryPolicy,
    pub auth: AuthPolicy,
    pub timeout: TimeoutClass,
    /// JSON body fields that must be present before the backend is called
    pub required_body: &'static [&'static str],
    pub not_found: Option<NotFoundFallback>,
    /// Answer 503 with this message when the backend is unreachable (500 otherwise)
    pub unavailable: Option<&'static str>,
    /// Field added as `[]` to every error body
    pub empty_on_error: Option<&'static str>,
    /// Message used when the backend gives none
    pub error_message: &'static str,
}

impl RouteSpec {
    const fn get(name: &'static str, path: &'static str, upstream: &'static str) -> Self {
        Self {
            name,
            verb: Verb::Get,
            path,
            upstream,
            query: QueryPolicy::Declared(&[]),
            auth: AuthPolicy::None,
            timeout: TimeoutClass::Default,
            required_body: &[],
            not_found: None,
            unavailable: None,
            empty_on_error: None,
            error_message: "Failed to fetch data",
        }
    }

    /// Backend path with `{param}` segments substituted and percent-encoded
    pub fn upstream_path(&self, params: &HashMap<String, String>) -> String {
        self.upstream
            .split('/')
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                {
                    Some(name) => params
                        .get(name)
                        .map(|v| utf8_percent_encode(v, PATH_SEGMENT).to_string())
                        .unwrap_or_default(),
                    None => segment.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

const CHAT_UNAVAILABLE: &str = "Chat service is currently unavailable";

pub static ROUTES: &[RouteSpec] = &[
    RouteSpec {
        query: QueryPolicy::PassThrough,
        error_message: "Failed to fetch products",
        ..RouteSpec::get("products", "/products", "/products")
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[
            param!("q" => "q"),
            param!("limit" => "limit" = "20"),
            param!("page" => "page" = "1"),
        ]),
        error_message: "Failed to search products",
        ..RouteSpec::get("product_search", "/products/search", "/products/search")
    },
    RouteSpec {
        error_message: "Failed to fetch product",
        ..RouteSpec::get("product", "/products/{id}", "/products/{id}")
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[
            param!("days" => "days" = "90"),
            param!("retailerId" => "retailer_id"),
        ]),
        error_message: "Failed to fetch price history",
        ..RouteSpec::get(
            "price_history",
            "/products/{id}/price-history",
            "/products/{id}/price-history",
        )
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("limit" => "limit" = "6")]),
        timeout: TimeoutClass::Extended,
        not_found: Some(NotFoundFallback::Message(
            "Similar products not available for this product",
        )),
        error_message: "Failed to fetch similar products",
        ..RouteSpec::get(
            "similar_products",
            "/products/{id}/similar",
            "/products/{id}/similar",
        )
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("days" => "days" = "30")]),
        timeout: TimeoutClass::Extended,
        not_found: Some(NotFoundFallback::Message(
            "Price forecast not available for this product",
        )),
        error_message: "Failed to fetch price forecast",
        ..RouteSpec::get(
            "price_forecast",
            "/products/{id}/forecast",
            "/products/{id}/price-forecast",
        )
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("days" => "days" = "90")]),
        timeout: TimeoutClass::Extended,
        not_found: Some(NotFoundFallback::EmptyList),
        error_message: "Failed to fetch price anomalies",
        ..RouteSpec::get(
            "price_anomalies",
            "/products/{id}/anomalies",
            "/products/{id}/anomalies",
        )
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("limit" => "limit" = "5")]),
        auth: AuthPolicy::Forward,
        timeout: TimeoutClass::Extended,
        empty_on_error: Some("recommended_products"),
        error_message: "Failed to fetch product recommendations",
        ..RouteSpec::get(
            "product_recommendations",
            "/products/{id}/recommendations",
            "/recommendations/products/{id}",
        )
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("limit" => "limit" = "10")]),
        auth: AuthPolicy::Forward,
        timeout: TimeoutClass::Extended,
        empty_on_error: Some("recommended_products"),
        error_message: "Failed to fetch recommendations",
        ..RouteSpec::get("recommendations", "/recommendations", "/recommendations")
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[
            param!("page" => "page" = "1"),
            param!("pageSize" => "page_size" = "20"),
            param!("sortBy" => "sort_by" = "discount"),
            param!("category" => "category"),
            param!("retailerId" => "retailer_id"),
        ]),
        error_message: "Failed to fetch deals",
        ..RouteSpec::get("deals", "/deals", "/deals")
    },
    RouteSpec {
        error_message: "Failed to fetch categories",
        ..RouteSpec::get("categories", "/categories", "/categories")
    },
    RouteSpec {
        error_message: "Failed to fetch retailers",
        ..RouteSpec::get("retailers", "/retailers", "/retailers")
    },
    RouteSpec {
        auth: AuthPolicy::Forward,
        error_message: "Failed to fetch favorites",
        ..RouteSpec::get("favorites", "/favorites", "/users/me/favorites")
    },
    RouteSpec {
        verb: Verb::Post,
        auth: AuthPolicy::Forward,
        required_body: &["product_id"],
        error_message: "Failed to add favorite",
        ..RouteSpec::get("add_favorite", "/favorites", "/users/me/favorites")
    },
    RouteSpec {
        verb: Verb::Delete,
        auth: AuthPolicy::Forward,
        error_message: "Failed to remove favorite",
        ..RouteSpec::get("remove_favorite", "/favorites/{id}", "/users/me/favorites/{id}")
    },
    RouteSpec {
        verb: Verb::Post,
        auth: AuthPolicy::Forward,
        timeout: TimeoutClass::Extended,
        required_body: &["message"],
        unavailable: Some(CHAT_UNAVAILABLE),
        error_message: "Failed to get chat response",
        ..RouteSpec::get("chat", "/chat", "/chat")
    },
    RouteSpec {
        query: QueryPolicy::Declared(&[param!("limit" => "limit" = "50")]),
        auth: AuthPolicy::Forward,
        unavailable: Some(CHAT_UNAVAILABLE),
        error_message: "Failed to fetch chat history",
        ..RouteSpec::get("chat_history", "/chat/history", "/chat/history")
    },
];

/// Proxied API routes, grouped so GET/POST/DELETE on one path share a router
fn api_router() -> Router<AppState> {
    let mut grouped: BTreeMap<&'static str, MethodRouter<AppState>> = BTreeMap::new();

    for route in ROUTES {
        let handler = move |State(state): State<AppState>,
                            Path(params): Path<HashMap<String, String>>,
                            RawQuery(query): RawQuery,
                            headers: HeaderMap,
                            body: Bytes| async move {
            proxy_handler(route, state, params, query, headers, body).await
        };

        let methods = grouped
            .remove(route.path)
            .unwrap_or_else(MethodRouter::new);
        grouped.insert(route.path, methods.on(route.verb.filter(), handler));
    }

    grouped
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| router.route(path, methods))
}

/// Full application router (without middleware layers)
pub fn router(state: AppState) -> Router {
    let images = Router::new()
        .route("/images", get(image_redirect_handler))
        .route("/images/resolve", get(resolve_image_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest(API_PREFIX, api_router().merge(images))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        upstream::{fake::FakeUpstream, UpstreamError},
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::{collections::HashSet, sync::Arc};
    use tower::ServiceExt;

    fn app(upstream: Arc<FakeUpstream>) -> Router {
        router(AppState::new(Config::from_env(), upstream))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_route_names_are_unique() {
        let mut names = HashSet::new();
        for route in ROUTES {
            assert!(names.insert(route.name), "duplicate route {}", route.name);
        }
    }

    #[test]
    fn test_method_and_path_pairs_are_unique() {
        let mut seen = HashSet::new();
        for route in ROUTES {
            assert!(seen.insert((route.verb, route.path)), "duplicate {}", route.path);
        }
    }

    #[test]
    fn test_upstream_path_substitutes_and_encodes() {
        let route = ROUTES.iter().find(|r| r.name == "price_forecast").unwrap();
        let params = HashMap::from([("id".to_string(), "a b/c".to_string())]);
        assert_eq!(route.upstream_path(&params), "/products/a%20b%2Fc/price-forecast");
    }

    #[tokio::test]
    async fn test_price_history_defaults_days() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!([])));
        let (status, _) = send(
            app(upstream.clone()),
            get_request("/api/v1/products/42/price-history"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let seen = upstream.last_request().unwrap();
        assert_eq!(seen.path, "/products/42/price-history");
        assert_eq!(seen.query, vec![("days".to_string(), "90".to_string())]);
    }

    #[tokio::test]
    async fn test_price_history_forwards_retailer_filter() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!([])));
        send(
            app(upstream.clone()),
            get_request("/api/v1/products/42/price-history?retailerId=7&utm_source=x"),
        )
        .await;

        let seen = upstream.last_request().unwrap();
        assert_eq!(
            seen.query,
            vec![
                ("days".to_string(), "90".to_string()),
                ("retailer_id".to_string(), "7".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_route_wins_over_product_id() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({ "items": [] })));
        send(app(upstream.clone()), get_request("/api/v1/products/search?q=kettle")).await;

        let seen = upstream.last_request().unwrap();
        assert_eq!(seen.path, "/products/search");
        assert_eq!(seen.query[0], ("q".to_string(), "kettle".to_string()));
    }

    #[tokio::test]
    async fn test_products_forward_whole_query() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({ "items": [] })));
        send(
            app(upstream.clone()),
            get_request("/api/v1/products?brand=acme&min_price=100"),
        )
        .await;

        let seen = upstream.last_request().unwrap();
        assert_eq!(
            seen.query,
            vec![
                ("brand".to_string(), "acme".to_string()),
                ("min_price".to_string(), "100".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_body_and_status_pass_through() {
        let upstream = Arc::new(FakeUpstream::json(
            StatusCode::CREATED,
            json!({ "id": 5, "product_id": 42 }),
        ));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/favorites")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer t")
            .body(Body::from(r#"{"product_id":42}"#))
            .unwrap();

        let (status, body) = send(app(upstream.clone()), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "id": 5, "product_id": 42 }));

        let seen = upstream.last_request().unwrap();
        assert_eq!(seen.method, Method::POST);
        assert_eq!(seen.authorization.as_deref(), Some("Bearer t"));
        assert_eq!(seen.body, Some(json!({ "product_id": 42 })));
    }

    #[tokio::test]
    async fn test_delete_favorite_routes_by_method() {
        let upstream = Arc::new(FakeUpstream::empty(StatusCode::NO_CONTENT));
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/favorites/42")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(app(upstream.clone()), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(upstream.last_request().unwrap().path, "/users/me/favorites/42");
    }

    #[tokio::test]
    async fn test_recommendations_network_failure_is_500_with_empty_list() {
        let upstream = Arc::new(FakeUpstream::failing(|| {
            UpstreamError::Unavailable("connection refused".to_string())
        }));
        let (status, body) = send(
            app(upstream),
            get_request("/api/v1/products/42/recommendations"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["recommended_products"], json!([]));
        assert_eq!(body["error"], "Failed to fetch product recommendations");
    }

    #[tokio::test]
    async fn test_chat_network_failure_is_503() {
        let upstream = Arc::new(FakeUpstream::failing(|| {
            UpstreamError::Unavailable("connection refused".to_string())
        }));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"cheapest rice cooker?"}"#))
            .unwrap();

        let (status, body) = send(app(upstream), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], CHAT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_similar_products_not_found() {
        let upstream = Arc::new(FakeUpstream::json(
            StatusCode::NOT_FOUND,
            json!({ "detail": "Not Found" }),
        ));
        let (status, body) = send(app(upstream), get_request("/api/v1/products/42/similar")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Similar products not available for this product");
    }

    #[tokio::test]
    async fn test_chat_requires_message_without_calling_backend() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({})));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, body) = send(app(upstream.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "message is required");
        assert!(upstream.last_request().is_none());
    }

    #[tokio::test]
    async fn test_resolve_image_endpoint() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({})));
        let (status, body) = send(
            app(upstream),
            get_request("/api/v1/images/resolve?src=https%3A%2F%2Fwww.onei.lk%2Fa.jpg"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "url": "https://images.weserv.nl/?url=ssl%3Aonei.lk%2Fa.jpg" })
        );
    }

    #[tokio::test]
    async fn test_image_redirect_endpoint() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({})));
        let response = app(upstream.clone())
            .oneshot(get_request("/api/v1/images?src=https%3A%2F%2Fonei.lk%2Fa.jpg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://images.weserv.nl/?url=ssl%3Aonei.lk%2Fa.jpg"
        );

        let (status, _) = send(app(upstream), get_request("/api/v1/images?src=logo.png")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let upstream = Arc::new(FakeUpstream::json(StatusCode::OK, json!({})));
        let (status, body) = send(app(upstream), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
