//! Request routing and upstream dispatch.
//!
//! # Responsibilities
//! - Serve cacheable GETs from the response cache
//! - Select a healthy endpoint and check out a pooled connection
//! - Forward the request under the per-request deadline
//! - Store cacheable responses and return the connection to its pool
//! - Retry once on another endpoint after an upstream failure
//!
//! # Design Decisions
//! - Registry, pools and cache each use their own lock; none is held
//!   across an upstream call
//! - Responses are buffered so the connection can be released and the
//!   body cached
//! - Only 2xx responses are cached

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};

use crate::cache::{derive_key, service_prefix, CachedResponse, KeyInput, ResponseCache};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::http::request::{
    end_to_end_headers, FORWARDED_BY_HEADER, FORWARDED_BY_VALUE, REQUEST_ID_HEADER,
};
use crate::http::response::{CacheStatus, ProxyResponse};
use crate::load_balancer::backend::{EndpointId, ServiceEndpoint};
use crate::load_balancer::ServiceRegistry;
use crate::observability::metrics;
use crate::pool::PoolManager;
use crate::resilience::{with_timeout, RetryPolicy};

/// A client request addressed to a logical service.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub service: String,
    pub method: Method,
    /// Path after `/service/{name}`, always starting with `/`.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: String,
}

/// Per-request routing outcome: where it goes and how it is cached.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub endpoint: ServiceEndpoint,
    pub cache_key: Option<String>,
}

#[derive(Debug, Clone)]
struct CachePolicy {
    enabled: bool,
    ttl: Option<Duration>,
    key_params: Vec<String>,
}

/// Routes requests through cache, registry and connection pools.
#[derive(Debug)]
pub struct ProxyRouter {
    registry: Arc<ServiceRegistry>,
    pools: Arc<PoolManager>,
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
    policies: HashMap<String, CachePolicy>,
    request_timeout: Duration,
    max_response_bytes: usize,
    retry: RetryPolicy,
}

impl ProxyRouter {
    pub fn new(
        config: &ProxyConfig,
        registry: Arc<ServiceRegistry>,
        pools: Arc<PoolManager>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let mut policies = HashMap::new();
        for svc in &config.services {
            // Peers share the policy of the first entry with their name.
            policies.entry(svc.name.clone()).or_insert_with(|| CachePolicy {
                enabled: svc.cache.enabled,
                ttl: svc.cache.ttl_secs.map(Duration::from_secs),
                key_params: svc.cache.key_params.clone(),
            });
        }

        Self {
            registry,
            pools,
            cache,
            cache_enabled: config.cache.enabled,
            policies,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            max_response_bytes: config.listener.max_response_bytes,
            retry: RetryPolicy::from_config(&config.retries),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Cache key for `request`, or `None` if it must not be cached.
    pub fn cache_key(&self, request: &ProxyRequest) -> Option<String> {
        if !self.cache_enabled || request.method != Method::GET {
            return None;
        }
        let policy = self.policies.get(&request.service).filter(|p| p.enabled)?;
        Some(derive_key(
            KeyInput {
                service: &request.service,
                method: request.method.as_str(),
                path: &request.path,
                query: request.query.as_deref(),
                body: &request.body,
            },
            &policy.key_params,
        ))
    }

    /// Drop every cached response of `service`. Returns how many were removed.
    pub fn invalidate_service(&self, service: &str) -> Result<usize> {
        if !self.registry.contains(service) {
            return Err(ProxyError::UnknownService(service.to_string()));
        }
        let removed = self.cache.invalidate_prefix(&service_prefix(service));
        tracing::info!(service = %service, removed, "Invalidated cached responses");
        Ok(removed)
    }

    /// Route one request end to end.
    pub async fn route(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        if !self.registry.contains(&request.service) {
            return Err(ProxyError::UnknownService(request.service));
        }

        let cache_key = self.cache_key(&request);
        if let Some(key) = &cache_key {
            if let Some(hit) = self.lookup(&request, key) {
                return Ok(hit);
            }
        }

        let mut tried: Vec<EndpointId> = Vec::new();
        let mut last_error: Option<ProxyError> = None;
        let mut attempt = 0;

        loop {
            let endpoint = match self.registry.select_excluding(&request.service, &tried) {
                Ok(endpoint) => endpoint,
                // A failed attempt with no alternative left surfaces as that failure.
                Err(e) => return Err(last_error.unwrap_or(e)),
            };
            let decision = RoutingDecision {
                endpoint,
                cache_key: cache_key.clone(),
            };

            let started = Instant::now();
            match self.forward(&request, &decision).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    if e.is_upstream_failure() {
                        metrics::record_upstream_error(&request.service, e.kind());
                        tracing::warn!(
                            request_id = %request.request_id,
                            service = %request.service,
                            endpoint = %decision.endpoint.id,
                            latency_ms,
                            attempt,
                            error = %e,
                            "Upstream request failed"
                        );
                    }

                    if !self.retry.should_retry(&e, attempt) {
                        return Err(e);
                    }
                    tried.push(decision.endpoint.id.clone());
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }
    }

    fn lookup(&self, request: &ProxyRequest, key: &str) -> Option<ProxyResponse> {
        let cached = self.cache.get(key)?;
        match cached.decode(key) {
            Ok((status, headers)) => {
                tracing::debug!(request_id = %request.request_id, service = %request.service, "Cache hit");
                Some(ProxyResponse {
                    status,
                    headers,
                    body: cached.body,
                    service: request.service.clone(),
                    endpoint: None,
                    cache: CacheStatus::Hit,
                })
            }
            Err(_) => {
                self.cache.purge_corrupt(key);
                None
            }
        }
    }

    /// One attempt against the decided endpoint.
    async fn forward(&self, request: &ProxyRequest, decision: &RoutingDecision) -> Result<ProxyResponse> {
        let endpoint = &decision.endpoint;
        let mut conn = self.pools.acquire(&endpoint.id).await?;
        let upstream_request = build_upstream_request(request, endpoint)?;

        let limit = self.max_response_bytes;
        let (status, headers, body) = with_timeout(&endpoint.id, self.request_timeout, async {
            let response = conn.send(upstream_request).await?;
            let (parts, incoming) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(incoming), limit)
                .await
                .map_err(|e| ProxyError::UpstreamProtocol {
                    endpoint: endpoint.id.clone(),
                    message: format!("reading response body: {}", e),
                })?;
            Ok((parts.status, parts.headers, body))
        })
        .await?;

        conn.release();

        let headers = end_to_end_headers(&headers);
        if let Some(key) = &decision.cache_key {
            self.store(key, request, status, &headers, &body);
        }

        tracing::debug!(
            request_id = %request.request_id,
            endpoint = %endpoint.id,
            status = status.as_u16(),
            "Upstream responded"
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
            service: request.service.clone(),
            endpoint: Some(endpoint.id.clone()),
            cache: CacheStatus::Miss,
        })
    }

    fn store(&self, key: &str, request: &ProxyRequest, status: StatusCode, headers: &HeaderMap, body: &Bytes) {
        if !status.is_success() {
            return;
        }
        let ttl = self.policies.get(&request.service).and_then(|p| p.ttl);
        let value = CachedResponse::new(status, headers, body.clone());
        if self.cache.set(key, value, ttl) {
            tracing::debug!(request_id = %request.request_id, service = %request.service, "Response cached");
        }
    }
}

fn build_upstream_request(request: &ProxyRequest, endpoint: &ServiceEndpoint) -> Result<Request<Body>> {
    let target = endpoint.upstream_target(&request.path, request.query.as_deref());
    let protocol_error = |message: String| ProxyError::UpstreamProtocol {
        endpoint: endpoint.id.clone(),
        message,
    };

    let mut upstream = Request::builder()
        .method(request.method.clone())
        .uri(target)
        .body(Body::from(request.body.clone()))
        .map_err(|e| protocol_error(e.to_string()))?;

    let headers = upstream.headers_mut();
    *headers = end_to_end_headers(&request.headers);
    let host = HeaderValue::from_str(endpoint.authority()).map_err(|e| protocol_error(e.to_string()))?;
    headers.insert(header::HOST, host);
    headers.insert(FORWARDED_BY_HEADER, HeaderValue::from_static(FORWARDED_BY_VALUE));
    if let Ok(id) = HeaderValue::from_str(&request.request_id) {
        headers.insert(REQUEST_ID_HEADER, id);
    }
    if !request.body.is_empty() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(request.body.len()));
    }

    Ok(upstream)
}
