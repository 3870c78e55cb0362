//! Request-side helpers.
//!
//! # Responsibilities
//! - Generate a request ID when the client sent none and echo it back
//! - Filter hop-by-hop headers before forwarding upstream

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";
pub const FORWARDED_BY_VALUE: &str = "storage-proxy";

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that sets `x-request-id` on requests lacking one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), UuidRequestId)
}

/// Layer that copies the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}

/// The request ID set by [`set_request_id_layer`], or "unknown".
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Headers that apply to a single connection and must not be forwarded.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy end-to-end headers. Drops hop-by-hop headers, anything named in
/// `Connection`, and the framing headers the proxy recomputes.
pub fn end_to_end_headers(source: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<String> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if is_hop_by_hop(name)
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || connection_listed.iter().any(|t| t == name.as_str())
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_headers() {
        let mut source = HeaderMap::new();
        source.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        source.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        source.insert("x-trace", HeaderValue::from_static("1"));
        source.insert(header::HOST, HeaderValue::from_static("proxy:8082"));
        source.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        source.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        source.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        source.append("x-multi", HeaderValue::from_static("a"));
        source.append("x-multi", HeaderValue::from_static("b"));

        let headers = end_to_end_headers(&source);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[header::ACCEPT], "application/json");
        assert_eq!(headers.get_all("x-multi").iter().count(), 2);
        assert!(headers.get("x-trace").is_none());
    }

    #[test]
    fn test_uuid_request_id() {
        let request = Request::new(());
        let id = UuidRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
