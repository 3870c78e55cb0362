//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every endpoint on its own interval
//! - Update endpoint health state in the registry
//! - Log every state transition

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time;

use crate::health::state::HealthTransition;
use crate::load_balancer::backend::ServiceEndpoint;
use crate::load_balancer::registry::ServiceRegistry;
use crate::observability::metrics;

pub const HEALTH_CHECK_USER_AGENT: &str = "storage-proxy-health-check/1.0";

/// Background prober. Never touches the connection pools or the cache.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(1)
            .build(HttpConnector::new());

        Self { registry, client }
    }

    /// Run one probe loop per endpoint until shutdown.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        let endpoints = self.registry.all_endpoints();
        tracing::info!(endpoints = endpoints.len(), "Health monitor starting");

        let mut loops = JoinSet::new();
        for endpoint in endpoints {
            let monitor = self.clone();
            let shutdown = shutdown.resubscribe();
            loops.spawn(async move { monitor.probe_loop(endpoint, shutdown).await });
        }

        while loops.join_next().await.is_some() {}
        tracing::info!("Health monitor stopped");
    }

    async fn probe_loop(&self, endpoint: ServiceEndpoint, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(endpoint.probe.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_endpoint(&endpoint).await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(endpoint = %endpoint.id, "Probe loop received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Probe one endpoint and apply the result to the registry.
    pub async fn check_endpoint(&self, endpoint: &ServiceEndpoint) -> Option<HealthTransition> {
        let healthy = self.probe(endpoint).await;

        let result = if healthy {
            self.registry.mark_healthy(&endpoint.id)
        } else {
            self.registry.mark_unhealthy(&endpoint.id)
        };

        match result {
            Ok(transition) => {
                transition.log();
                metrics::record_backend_health(&endpoint.id.to_string(), transition.to.is_routable());
                Some(transition)
            }
            Err(e) => {
                tracing::error!(endpoint = %endpoint.id, error = %e, "Probed endpoint is not registered");
                None
            }
        }
    }

    /// GET the health path; only a 200 within the timeout counts as success.
    async fn probe(&self, endpoint: &ServiceEndpoint) -> bool {
        let request = match Request::builder()
            .method("GET")
            .uri(endpoint.health_url())
            .header("user-agent", HEALTH_CHECK_USER_AGENT)
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(endpoint = %endpoint.id, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(endpoint.probe.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => true,
            Ok(Ok(response)) => {
                tracing::warn!(endpoint = %endpoint.id, status = %response.status(), "Health check failed: non-200 status");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint.id, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(
                    endpoint = %endpoint.id,
                    timeout_ms = endpoint.probe.timeout.as_millis() as u64,
                    "Health check failed: timeout"
                );
                false
            }
        }
    }
}
