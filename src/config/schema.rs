//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the storage proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Backend service definitions. Entries sharing a name are peers.
    pub services: Vec<ServiceConfig>,

    /// Selection policy across peers of one service.
    pub balancer: BalancerConfig,

    /// Global health check switch.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Upstream connection pool settings.
    pub pool: PoolConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8082").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Maximum upstream response body buffered per request.
    pub max_response_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8082".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A single backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name, the `{name}` in `/service/{name}/...`.
    pub name: String,

    /// Backend host.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Prefix prepended to every forwarded path.
    #[serde(default)]
    pub base_path: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Per-endpoint override of `pool.max_connections`.
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// Active probe settings.
    #[serde(default)]
    pub health_check: ServiceHealthConfig,

    /// Response caching for this service.
    #[serde(default)]
    pub cache: ServiceCacheConfig,
}

fn default_weight() -> u32 {
    1
}

/// Probe settings for one endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceHealthConfig {
    /// Path probed with GET; must answer 200 when ready.
    pub path: String,

    /// Seconds between probes.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Consecutive failures before the endpoint is marked unhealthy (1..=3).
    pub failure_threshold: u32,
}

impl Default for ServiceHealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 30,
            timeout_secs: 10,
            failure_threshold: 1,
        }
    }
}

impl ServiceHealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Cache policy for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceCacheConfig {
    /// Cache GET responses from this service.
    pub enabled: bool,

    /// TTL override; falls back to `cache.default_ttl_secs`.
    pub ttl_secs: Option<u64>,

    /// Query/body parameters that take part in the cache key.
    pub key_params: Vec<String>,
}

impl Default for ServiceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
            key_params: Vec::new(),
        }
    }
}

/// Load balancing strategy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    RoundRobin,
    #[default]
    WeightedRoundRobin,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    pub strategy: BalancingStrategy,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upstream request timeout (send + full response) in seconds.
    pub request_secs: u64,

    /// Deadline for a whole client request, retries included.
    pub client_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            client_secs: 75,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries against an alternate endpoint after an upstream failure (0 or 1).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections per endpoint (idle + checked out).
    pub max_connections: usize,

    /// Idle connections older than this are discarded.
    pub keepalive_timeout_secs: u64,

    /// Interval of the idle sweep.
    pub sweep_interval_secs: u64,

    /// Check liveness before returning a connection to the idle queue.
    pub validate_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            keepalive_timeout_secs: 300,
            sweep_interval_secs: 60,
            validate_on_release: true,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global cache switch.
    pub enabled: bool,

    /// Maximum number of entries.
    pub max_size: usize,

    /// TTL for services without an override.
    pub default_ttl_secs: u64,

    /// Interval of the expiry sweep.
    pub cleanup_interval_secs: u64,

    /// Responses with larger bodies are not cached.
    pub max_entry_bytes: usize,

    /// Optional warm-restart snapshot file.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            default_ttl_secs: 300,
            cleanup_interval_secs: 60,
            max_entry_bytes: 1024 * 1024,
            snapshot_path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_service_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[services]]
            name = "chromadb"
            host = "localhost"
            port = 8001
            "#,
        )
        .unwrap();

        let service = &config.services[0];
        assert_eq!(service.weight, 1);
        assert_eq!(service.health_check.path, "/health");
        assert_eq!(service.health_check.failure_threshold, 1);
        assert!(service.cache.enabled);
        assert_eq!(config.balancer.strategy, BalancingStrategy::WeightedRoundRobin);
        assert_eq!(config.retries.max_retries, 1);
    }

    #[test]
    fn test_full_service_section() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [balancer]
            strategy = "round_robin"

            [[services]]
            name = "memory_service"
            host = "10.0.0.7"
            port = 3000
            base_path = "/api"
            weight = 3
            max_connections = 4

            [services.health_check]
            path = "/ready"
            interval_secs = 5
            timeout_secs = 2
            failure_threshold = 3

            [services.cache]
            ttl_secs = 60
            key_params = ["query", "domain", "limit"]
            "#,
        )
        .unwrap();

        let service = &config.services[0];
        assert_eq!(config.balancer.strategy, BalancingStrategy::RoundRobin);
        assert_eq!(service.weight, 3);
        assert_eq!(service.max_connections, Some(4));
        assert_eq!(service.health_check.timeout(), Duration::from_secs(2));
        assert_eq!(service.cache.ttl_secs, Some(60));
        assert_eq!(service.cache.key_params.len(), 3);
    }
}
