//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the registry, pools, cache and router in dependency order
//! - Restore the cache snapshot, if any
//!
//! # Design Decisions
//! - Fail fast: an invalid config is the only fatal startup error
//! - All shared state lives in one explicitly passed [`ProxyContext`]

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{snapshot, ResponseCache};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, ProxyConfig};
use crate::load_balancer::backend::ServiceEndpoint;
use crate::load_balancer::ServiceRegistry;
use crate::pool::PoolManager;
use crate::routing::ProxyRouter;

/// Shared state for one proxy instance.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub config: Arc<ProxyConfig>,
    pub registry: Arc<ServiceRegistry>,
    pub pools: Arc<PoolManager>,
    pub cache: Arc<ResponseCache>,
    pub router: Arc<ProxyRouter>,
}

impl ProxyContext {
    pub fn from_config(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Invalid)?;

        let registry = Arc::new(ServiceRegistry::new(config.balancer.strategy));
        for svc in &config.services {
            registry.register(ServiceEndpoint::from_config(svc)).map_err(|e| {
                ConfigError::Invalid(vec![ValidationError::new("services", e.to_string())])
            })?;
        }

        let pools = Arc::new(PoolManager::from_services(
            &config.services,
            &config.pool,
            Duration::from_secs(config.timeouts.connect_secs),
        ));

        let cache = Arc::new(ResponseCache::from_config(&config.cache));
        if config.cache.enabled {
            if let Some(path) = &config.cache.snapshot_path {
                snapshot::load(&cache, path);
            }
        }

        let router = Arc::new(ProxyRouter::new(&config, registry.clone(), pools.clone(), cache.clone()));

        tracing::info!(
            services = registry.health_summary().len(),
            endpoints = config.services.len(),
            strategy = ?config.balancer.strategy,
            cache_enabled = config.cache.enabled,
            "Proxy context initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            pools,
            cache,
            router,
        })
    }

    /// Release resources after the server has stopped.
    pub fn shutdown(&self) {
        self.pools.close_all();
        if self.config.cache.enabled {
            if let Some(path) = &self.config.cache.snapshot_path {
                if let Err(e) = snapshot::save(&self.cache, path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to save cache snapshot");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_fatal() {
        let config = ProxyConfig::default();
        assert!(matches!(ProxyContext::from_config(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_peers_share_a_service() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[services]]
            name = "alpha"
            host = "127.0.0.1"
            port = 9000

            [[services]]
            name = "alpha"
            host = "127.0.0.1"
            port = 9001
            weight = 3
            "#,
        )
        .unwrap();
        let ctx = ProxyContext::from_config(config).unwrap();
        assert_eq!(ctx.registry.get("alpha").unwrap().len(), 2);
        assert_eq!(ctx.pools.stats().len(), 2);
    }

    #[test]
    fn test_snapshot_written_on_shutdown() {
        let dir = std::env::temp_dir().join(format!("storage-proxy-ctx-{}", uuid::Uuid::new_v4()));
        let path = dir.join("cache.json");
        let mut config: ProxyConfig = toml::from_str(
            r#"
            [[services]]
            name = "alpha"
            host = "127.0.0.1"
            port = 9000
            "#,
        )
        .unwrap();
        config.cache.snapshot_path = Some(path.clone());

        let ctx = ProxyContext::from_config(config.clone()).unwrap();
        ctx.cache.set(
            "alpha:k",
            crate::cache::CachedResponse::new(
                axum::http::StatusCode::OK,
                &axum::http::HeaderMap::new(),
                axum::body::Bytes::from_static(b"warm"),
            ),
            None,
        );
        ctx.shutdown();
        assert!(path.exists());

        let restarted = ProxyContext::from_config(config).unwrap();
        assert_eq!(restarted.cache.len(), 1);
        std::fs::remove_dir_all(dir).ok();
    }
}
