//! Per-endpoint pool ownership and the idle sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::{PoolConfig, ServiceConfig};
use crate::error::{ProxyError, Result};
use crate::load_balancer::backend::EndpointId;
use crate::pool::upstream::{UpstreamConnection, UpstreamPool};
use crate::pool::{Checkout, PoolSettings, PoolStats};

/// One [`UpstreamPool`] per registered endpoint.
#[derive(Debug)]
pub struct PoolManager {
    pools: HashMap<EndpointId, Arc<UpstreamPool>>,
    connect_timeout: Duration,
}

impl PoolManager {
    /// Build a pool for every configured endpoint. A service-level
    /// `max_connections` overrides the global pool limit.
    pub fn from_services(services: &[ServiceConfig], config: &PoolConfig, connect_timeout: Duration) -> Self {
        let pools = services
            .iter()
            .map(|svc| {
                let id = EndpointId::new(svc.name.as_str(), &svc.host, svc.port);
                let settings = PoolSettings {
                    max_connections: svc.max_connections.unwrap_or(config.max_connections).max(1),
                    keepalive_timeout: Duration::from_secs(config.keepalive_timeout_secs),
                    validate_on_release: config.validate_on_release,
                };
                (id.clone(), Arc::new(UpstreamPool::new(id, settings)))
            })
            .collect();

        Self { pools, connect_timeout }
    }

    pub fn get(&self, endpoint: &EndpointId) -> Option<Arc<UpstreamPool>> {
        self.pools.get(endpoint).cloned()
    }

    /// Check out a connection to `endpoint`, opening one if needed.
    pub async fn acquire(&self, endpoint: &EndpointId) -> Result<Checkout<UpstreamConnection>> {
        let pool = self
            .get(endpoint)
            .ok_or_else(|| ProxyError::UnknownService(endpoint.to_string()))?;
        let connect_timeout = self.connect_timeout;
        let target = endpoint.clone();
        pool.acquire(move || UpstreamConnection::connect(target, connect_timeout))
            .await
    }

    pub fn sweep_all(&self) -> usize {
        self.pools.values().map(|p| p.sweep()).sum()
    }

    pub fn close_all(&self) {
        for pool in self.pools.values() {
            pool.close();
        }
        tracing::info!(pools = self.pools.len(), "Connection pools closed");
    }

    /// Stats for every pool, ordered by endpoint.
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<_> = self.pools.values().map(|p| p.stats()).collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }

    /// Periodically drop stale idle connections until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_all();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept stale idle connections");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Pool sweeper received shutdown signal");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, port: u16, max_connections: Option<usize>) -> ServiceConfig {
        let toml = format!("name = \"{}\"\nhost = \"127.0.0.1\"\nport = {}\n", name, port);
        let mut svc: ServiceConfig = toml::from_str(&toml).unwrap();
        svc.max_connections = max_connections;
        svc
    }

    #[test]
    fn test_service_override_wins() {
        let manager = PoolManager::from_services(
            &[service("alpha", 9000, Some(2)), service("beta", 9100, None)],
            &PoolConfig::default(),
            Duration::from_secs(1),
        );
        let stats = manager.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].endpoint, "alpha@127.0.0.1:9000");
        assert_eq!(stats[0].max_connections, 2);
        assert_eq!(stats[1].max_connections, PoolConfig::default().max_connections);
    }

    #[tokio::test]
    async fn test_refused_connect_releases_slot() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = PoolManager::from_services(
            &[service("alpha", port, Some(1))],
            &PoolConfig::default(),
            Duration::from_secs(1),
        );
        let id = EndpointId::new("alpha", "127.0.0.1", port);
        let err = manager.acquire(&id).await.err().unwrap();
        assert!(err.is_upstream_failure());
        assert_eq!(manager.stats()[0].checked_out, 0);
    }
}
