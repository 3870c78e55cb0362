//! Request-scoped error types.
//!
//! Every variant here is local to a single client request: none of them may
//! take down the server or the background loops. Startup configuration
//! failures live in [`crate::config::loader::ConfigError`] instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::load_balancer::backend::EndpointId;

/// Errors raised while routing and forwarding a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No logical service with this name is registered.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Every endpoint of the service is unhealthy (or already tried).
    #[error("no healthy backend for service {0}")]
    NoHealthyBackend(String),

    /// All connections to the endpoint are checked out.
    #[error("connection pool exhausted for {0}")]
    PoolExhausted(EndpointId),

    /// The upstream did not answer within the request timeout.
    #[error("upstream {endpoint} timed out after {elapsed_ms}ms")]
    UpstreamTimeout { endpoint: EndpointId, elapsed_ms: u64 },

    /// Could not establish a connection to the upstream.
    #[error("cannot connect to upstream {endpoint}: {source}")]
    UpstreamConnect {
        endpoint: EndpointId,
        #[source]
        source: std::io::Error,
    },

    /// The connection was established but the exchange failed.
    #[error("upstream {endpoint} failed: {message}")]
    UpstreamProtocol { endpoint: EndpointId, message: String },

    /// A cached value could not be turned back into a response.
    #[error("corrupt cache entry {0}")]
    CacheCorruptEntry(String),

    /// The client body exceeded the configured limit.
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// An endpoint with the same identity is already registered.
    #[error("endpoint {0} is already registered")]
    DuplicateEndpoint(EndpointId),
}

impl ProxyError {
    /// HTTP status returned to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownService(_) => StatusCode::NOT_FOUND,
            ProxyError::NoHealthyBackend(_) | ProxyError::PoolExhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::UpstreamTimeout { .. }
            | ProxyError::UpstreamConnect { .. }
            | ProxyError::UpstreamProtocol { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::CacheCorruptEntry(_) | ProxyError::DuplicateEndpoint(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True for failures that may succeed against another endpoint.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamTimeout { .. }
                | ProxyError::UpstreamConnect { .. }
                | ProxyError::UpstreamProtocol { .. }
        )
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UnknownService(_) => "unknown_service",
            ProxyError::NoHealthyBackend(_) => "no_healthy_backend",
            ProxyError::PoolExhausted(_) => "pool_exhausted",
            ProxyError::UpstreamTimeout { .. } => "upstream_timeout",
            ProxyError::UpstreamConnect { .. } => "upstream_connect",
            ProxyError::UpstreamProtocol { .. } => "upstream_protocol",
            ProxyError::CacheCorruptEntry(_) => "cache_corrupt_entry",
            ProxyError::BodyTooLarge(_) => "body_too_large",
            ProxyError::DuplicateEndpoint(_) => "duplicate_endpoint",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Convenience alias for proxy results.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointId {
        EndpointId::new("alpha", "127.0.0.1", 9000)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::NoHealthyBackend("alpha".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::PoolExhausted(endpoint()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::UpstreamTimeout { endpoint: endpoint(), elapsed_ms: 10 }.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::UnknownService("nope".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_only_upstream_errors_are_retryable() {
        let connect = ProxyError::UpstreamConnect {
            endpoint: endpoint(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(connect.is_upstream_failure());
        assert!(!ProxyError::PoolExhausted(endpoint()).is_upstream_failure());
        assert!(!ProxyError::NoHealthyBackend("alpha".into()).is_upstream_failure());
    }
}
