//! Product image URL resolution
//!
//! The retailer behind [`TARGET_HOST`] blocks hotlinked images, so product
//! images on that host are rewritten through a public weserv-style image
//! proxy. Links that already point at a known image proxy are unwrapped first
//! so the same image always resolves to the same proxied URL.
//!
//! Resolution never fails: anything that cannot be parsed degrades to the
//! best URL known at that point.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Hotlink-protected retailer host (normalized: lowercase, no `www.`)
pub const TARGET_HOST: &str = "onei.lk";

/// Proxy endpoint; the upstream identifier is appended as the `url` value
pub const IMAGE_PROXY_BASE: &str = "https://images.weserv.nl/?url=";

/// Prefix weserv uses for https upstreams (`ssl:host/path`)
const SSL_PREFIX: &str = "ssl:";

/// Static theme assets on the target host are served without hotlink checks
const BYPASS_PATH_PREFIX: &str = "/wp-content/themes/";

/// Known image proxies and the query parameter holding the wrapped target
const PROXY_HOSTS: &[(&str, &str)] = &[
    ("images.weserv.nl", "url"),
    ("wsrv.nl", "url"),
    ("external-content.duckduckgo.com", "u"),
];

/// Outer proxy wrap plus the inner target. Proxies never nest further.
const MAX_RESOLVE_DEPTH: usize = 2;

/// Characters left as-is by JavaScript's `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Resolve an image source into the URL that should be displayed.
///
/// * absent or empty source: `None`
/// * not an absolute URL: the source verbatim
/// * target host: proxied, unless the path is a theme asset or an SVG
/// * known image proxy: the wrapped target, re-resolved once
/// * anything else: the parsed URL's canonical form
pub fn resolve_product_image_url(source: Option<&str>) -> Option<String> {
    let source = source.filter(|s| !s.is_empty())?;

    match Url::parse(source) {
        Ok(url) => Some(resolve_parsed(&url, source, MAX_RESOLVE_DEPTH)),
        Err(_) => Some(source.to_string()),
    }
}

/// `original` is the exact text `url` was parsed from; it is returned as-is
/// whenever the URL is left alone on the target host or a wrapped target
/// cannot be parsed.
fn resolve_parsed(url: &Url, original: &str, depth: usize) -> String {
    let Some(host) = normalized_host(url) else {
        return url.to_string();
    };

    if host == TARGET_HOST {
        return rewrite_target(url, original, &host);
    }

    if depth > 1 {
        if let Some(param) = wrapped_target_param(&host) {
            if let Some(wrapped) = query_value(url, param) {
                return match parse_wrapped_target(&wrapped) {
                    Some((inner, inner_text)) => resolve_parsed(&inner, &inner_text, depth - 1),
                    None => original.to_string(),
                };
            }
        }
    }

    url.to_string()
}

/// Lowercased host with a leading `www.` removed
fn normalized_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    })
}

fn rewrite_target(url: &Url, original: &str, host: &str) -> String {
    if is_bypassed(url.path()) {
        return original.to_string();
    }

    let query = url
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    let upstream = format!("{}{}{}{}", SSL_PREFIX, host, url.path(), query);

    format!(
        "{}{}",
        IMAGE_PROXY_BASE,
        utf8_percent_encode(&upstream, URI_COMPONENT)
    )
}

fn is_bypassed(path: &str) -> bool {
    let path = path.to_lowercase();
    if path.starts_with(BYPASS_PATH_PREFIX) {
        return true;
    }

    let file_name = path.rsplit('/').next().unwrap_or_default();
    matches!(file_name.rsplit_once('.'), Some((_, "svg")))
}

fn wrapped_target_param(host: &str) -> Option<&'static str> {
    PROXY_HOSTS
        .iter()
        .find(|(proxy, _)| *proxy == host)
        .map(|(_, param)| *param)
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Wrapped target as a URL, together with the text it was parsed from
fn parse_wrapped_target(raw: &str) -> Option<(Url, String)> {
    let candidate = if let Some(rest) = raw.strip_prefix(SSL_PREFIX) {
        format!("https://{}", rest)
    } else if has_http_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).ok()?;
    Some((url, candidate))
}

fn has_http_scheme(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
