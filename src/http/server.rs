//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Tag every response for a known service with `X-Service-Name`
//! - Wire up middleware (request ID, tracing, body limit, client timeout)
//! - Start background loops (health monitor, cache and pool sweepers)
//! - Serve until the shutdown broadcast, then drain and release resources

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::{sweeper, ResponseCache};
use crate::error::ProxyError;
use crate::health::HealthMonitor;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::SERVICE_NAME_HEADER;
use crate::lifecycle::ProxyContext;
use crate::load_balancer::ServiceRegistry;
use crate::observability::{metrics, tracing::make_request_span};
use crate::pool::PoolManager;
use crate::routing::{ProxyRequest, ProxyRouter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub registry: Arc<ServiceRegistry>,
    pub pools: Arc<PoolManager>,
    pub cache: Arc<ResponseCache>,
    pub max_body_bytes: usize,
}

/// HTTP front end of the proxy.
pub struct ProxyServer {
    router: Router,
    ctx: ProxyContext,
}

impl ProxyServer {
    pub fn new(ctx: ProxyContext) -> Self {
        let state = AppState {
            router: ctx.router.clone(),
            registry: ctx.registry.clone(),
            pools: ctx.pools.clone(),
            cache: ctx.cache.clone(),
            max_body_bytes: ctx.config.listener.max_body_bytes,
        };
        let router = Self::build_router(&ctx, state);
        Self { router, ctx }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(ctx: &ProxyContext, state: AppState) -> Router {
        let config = &ctx.config;
        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/cache/{name}", delete(invalidate_handler))
            .route("/service/{name}", get(proxy_handler).post(proxy_handler))
            .route("/service/{name}/{*path}", get(proxy_handler).post(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(propagate_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| make_request_span(req)))
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.client_secs))),
            )
    }

    pub fn context(&self) -> &ProxyContext {
        &self.ctx
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let config = self.ctx.config.clone();
        let mut background = JoinSet::new();

        if config.health_check.enabled {
            let monitor = HealthMonitor::new(self.ctx.registry.clone());
            background.spawn(monitor.run(shutdown.resubscribe()));
        }
        if config.cache.enabled {
            let cleanup = sweeper::spawn_cleanup_task(
                self.ctx.cache.clone(),
                Duration::from_secs(config.cache.cleanup_interval_secs),
                shutdown.resubscribe(),
            );
            background.spawn(async move {
                if let Err(e) = cleanup.await {
                    tracing::error!(error = %e, "Cache sweeper task failed");
                }
            });
        }
        background.spawn(
            self.ctx
                .pools
                .clone()
                .run_sweeper(Duration::from_secs(config.pool.sweep_interval_secs), shutdown.resubscribe()),
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        while background.join_next().await.is_some() {}
        self.ctx.shutdown();

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Split `/service/{name}/{rest}` into the service name and `/{rest}`.
fn split_service_path(path: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix("/service/")?;
    let (name, remainder) = match rest.split_once('/') {
        Some((name, remainder)) => (name, format!("/{}", remainder)),
        None => (rest, "/".to_string()),
    };
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), remainder))
}

/// Forward `/service/{name}/...` to the named backend.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let request_id = request_id(request.headers());
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();

    let Some((service, path)) = split_service_path(parts.uri.path()) else {
        return ProxyError::UnknownService(parts.uri.path().to_string()).into_response();
    };

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let err = ProxyError::BodyTooLarge(state.max_body_bytes);
            metrics::record_request(&method, err.status().as_u16(), &service, "MISS", started);
            return err.into_response();
        }
    };

    tracing::debug!(request_id = %request_id, service = %service, path = %path, "Proxying request");

    let proxy_request = ProxyRequest {
        service: service.clone(),
        method: parts.method,
        path,
        query: parts.uri.query().map(String::from),
        headers: parts.headers,
        body,
        request_id: request_id.clone(),
    };

    match state.router.route(proxy_request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status.as_u16(), &service, response.cache.as_str(), started);
            response.into_response()
        }
        Err(e) => {
            let status = e.status();
            metrics::record_request(&method, status.as_u16(), &service, "MISS", started);
            if status.is_server_error() {
                tracing::warn!(
                    request_id = %request_id,
                    service = %service,
                    status = status.as_u16(),
                    kind = e.kind(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );
            } else {
                tracing::debug!(request_id = %request_id, service = %service, error = %e, "Request rejected");
            }
            let known = !matches!(e, ProxyError::UnknownService(_));
            let mut response = e.into_response();
            if known {
                if let Ok(value) = HeaderValue::from_str(&service) {
                    response.headers_mut().insert(HeaderName::from_static(SERVICE_NAME_HEADER), value);
                }
            }
            response
        }
    }
}

/// Drop every cached response of one service.
async fn invalidate_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.router.invalidate_service(&name) {
        Ok(removed) => Json(json!({ "service": name, "removed": removed })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Aggregate backend health. Never touches the pools or the cache.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let services = state.registry.health_summary();
    let healthy = services.values().filter(|s| s.is_routable()).count();
    let status = if healthy == services.len() {
        "healthy"
    } else if healthy > 0 {
        "degraded"
    } else {
        "unhealthy"
    };
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Json(json!({
        "status": status,
        "timestamp": timestamp,
        "services": services,
    }))
}

/// Cache and pool counters.
async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "cache": state.cache.stats(),
        "pools": state.pools.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_service_path() {
        assert_eq!(
            split_service_path("/service/alpha/items/1"),
            Some(("alpha".to_string(), "/items/1".to_string()))
        );
        assert_eq!(
            split_service_path("/service/alpha"),
            Some(("alpha".to_string(), "/".to_string()))
        );
        assert_eq!(
            split_service_path("/service/alpha/"),
            Some(("alpha".to_string(), "/".to_string()))
        );
        assert_eq!(split_service_path("/service/"), None);
        assert_eq!(split_service_path("/other/alpha"), None);
    }
}
