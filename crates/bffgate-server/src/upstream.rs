//! Request and response translation for the upstream API.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, header},
    response::Response,
};
use url::Url;

use crate::error::BffError;
use crate::state::AppState;

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Build the upstream URL for a request path suffix.
///
/// `suffix` is the part of the path after `/api`. Dot segments are resolved
/// before the check, so a suffix that climbs out of the base path is rejected.
pub fn target_url(base: &Url, suffix: &str, query: Option<&str>) -> Result<Url, BffError> {
    let base_path = base.path().trim_end_matches('/');

    let mut url = base.clone();
    url.set_path(&format!("{}{}", base_path, suffix));
    url.set_query(query);

    let path = url.path();
    let inside = base_path.is_empty()
        || path == base_path
        || path
            .strip_prefix(base_path)
            .is_some_and(|rest| rest.starts_with('/'));
    if !inside {
        tracing::warn!(suffix, "Rejected path outside the upstream base");
        return Err(BffError::InvalidPath);
    }

    Ok(url)
}

/// Header names listed in the `Connection` header.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName, listed: &[HeaderName]) -> bool {
    HOP_BY_HOP.contains(&name.as_str()) || listed.contains(name)
}

/// Headers for the upstream request: browser credentials removed, bearer token added.
pub fn outbound_headers(
    incoming: &HeaderMap,
    csrf_header: &HeaderName,
    access_token: &str,
) -> Result<HeaderMap, BffError> {
    let listed = connection_listed(incoming);
    let mut headers = HeaderMap::with_capacity(incoming.len());

    for (name, value) in incoming {
        let stripped = *name == header::COOKIE
            || *name == header::HOST
            || *name == header::AUTHORIZATION
            || *name == header::CONTENT_LENGTH
            || name == csrf_header
            || is_hop_by_hop(name, &listed);
        if !stripped {
            headers.append(name.clone(), value.clone());
        }
    }

    let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|_| BffError::Internal("access token is not a valid header value".into()))?;
    headers.insert(header::AUTHORIZATION, bearer);

    Ok(headers)
}

/// Response headers with hop-by-hop headers removed.
pub fn inbound_headers(upstream: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if !is_hop_by_hop(name, &listed) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Send one request upstream. Never retried here.
pub async fn send(
    state: &AppState,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, BffError> {
    tracing::debug!(method = %method, path = %url.path(), "Forwarding request upstream");

    state
        .upstream
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            let timeout = e.is_timeout();
            tracing::warn!(error = %e, timeout, "Upstream request failed");
            BffError::UpstreamUnavailable { timeout }
        })
}

/// Stream an upstream response back to the browser.
pub fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = inbound_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
