//! Proxied responses and routing headers.
//!
//! Every proxied response carries `X-Service-Name` and `X-Cache`; both are
//! part of the client contract, not just diagnostics.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::load_balancer::backend::EndpointId;

pub const SERVICE_NAME_HEADER: &str = "x-service-name";
pub const CACHE_HEADER: &str = "x-cache";

/// Whether a response was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A fully buffered response ready to go back to the client.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub service: String,
    /// Endpoint that produced the body; `None` for cache hits.
    pub endpoint: Option<EndpointId>,
    pub cache: CacheStatus,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        let headers = response.headers_mut();
        if let Ok(service) = HeaderValue::from_str(&self.service) {
            headers.insert(HeaderName::from_static(SERVICE_NAME_HEADER), service);
        }
        headers.insert(
            HeaderName::from_static(CACHE_HEADER),
            HeaderValue::from_static(self.cache.as_str()),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_headers_added() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let response = ProxyResponse {
            status: StatusCode::CREATED,
            headers,
            body: Bytes::from_static(b"ok"),
            service: "alpha".into(),
            endpoint: None,
            cache: CacheStatus::Hit,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[SERVICE_NAME_HEADER], "alpha");
        assert_eq!(response.headers()[CACHE_HEADER], "HIT");
        assert_eq!(response.headers()["content-type"], "text/plain");
    }
}
