//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint and its routing metadata
//! - Track health state (Unknown/Healthy/Unhealthy) and consecutive failures
//! - Build upstream URIs from the configured base path

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::health::state::{HealthState, HealthTransition};

/// Identity of one endpoint: `service@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId {
    pub service: String,
    pub authority: String,
}

impl EndpointId {
    pub fn new(service: impl Into<String>, host: &str, port: u16) -> Self {
        Self {
            service: service.into(),
            authority: format!("{}:{}", host, port),
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service, self.authority)
    }
}

/// Probe parameters carried by each endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
}

/// A single backend endpoint.
///
/// Owned by the [`ServiceRegistry`](crate::load_balancer::registry::ServiceRegistry);
/// callers only ever see clones taken under the registry lock.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub id: EndpointId,
    pub host: String,
    pub port: u16,
    /// Prefix prepended to forwarded paths, without trailing slash.
    pub base_path: String,
    /// Routing weight, always >= 1.
    pub weight: u32,
    pub probe: ProbeSettings,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_check: Option<SystemTime>,
}

impl ServiceEndpoint {
    /// Create a new endpoint in the `Unknown` state.
    pub fn new(name: &str, host: &str, port: u16, base_path: &str, weight: u32, probe: ProbeSettings) -> Self {
        Self {
            id: EndpointId::new(name, host, port),
            host: host.to_string(),
            port,
            base_path: base_path.trim_end_matches('/').to_string(),
            weight: weight.max(1),
            probe,
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_check: None,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let probe = ProbeSettings {
            path: config.health_check.path.clone(),
            interval: config.health_check.interval(),
            timeout: config.health_check.timeout(),
            failure_threshold: config.health_check.failure_threshold.max(1),
        };
        Self::new(&config.name, &config.host, config.port, &config.base_path, config.weight, probe)
    }

    pub fn name(&self) -> &str {
        &self.id.service
    }

    /// `host:port`, used for the Host header and for connecting.
    pub fn authority(&self) -> &str {
        &self.id.authority
    }

    /// Return true if the endpoint may receive traffic.
    pub fn is_healthy(&self) -> bool {
        self.state.is_routable()
    }

    /// Origin-form target for a forwarded request.
    pub fn upstream_target(&self, remainder: &str, query: Option<&str>) -> String {
        let mut target = String::with_capacity(self.base_path.len() + remainder.len() + 1);
        target.push_str(&self.base_path);
        if !remainder.starts_with('/') {
            target.push('/');
        }
        target.push_str(remainder);
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(q);
        }
        target
    }

    /// URL probed by the health monitor.
    pub fn health_url(&self) -> String {
        format!("http://{}{}", self.authority(), self.probe.path)
    }

    // --- Health Logic ---

    /// Report a successful check. Resets the failure counter.
    pub fn record_success(&mut self) -> HealthTransition {
        let from = self.state;
        self.consecutive_failures = 0;
        self.state = HealthState::Healthy;
        self.last_check = Some(SystemTime::now());
        self.transition(from)
    }

    /// Report a failed check.
    pub fn record_failure(&mut self) -> HealthTransition {
        let from = self.state;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.probe.failure_threshold {
            self.state = HealthState::Unhealthy;
        }
        self.last_check = Some(SystemTime::now());
        self.transition(from)
    }

    fn transition(&self, from: HealthState) -> HealthTransition {
        HealthTransition {
            endpoint: self.id.clone(),
            from,
            to: self.state,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_endpoint(name: &str, port: u16, weight: u32, threshold: u32) -> ServiceEndpoint {
    ServiceEndpoint::new(
        name,
        "127.0.0.1",
        port,
        "",
        weight,
        ProbeSettings {
            path: "/health".to_string(),
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            failure_threshold: threshold,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_flips_state() {
        let mut ep = test_endpoint("alpha", 9000, 1, 3);
        assert_eq!(ep.record_failure().to, HealthState::Unknown);
        assert_eq!(ep.record_failure().to, HealthState::Unknown);
        let t = ep.record_failure();
        assert!(t.changed());
        assert_eq!(t.to, HealthState::Unhealthy);
        assert_eq!(ep.consecutive_failures, 3);
        assert!(!ep.is_healthy());

        let t = ep.record_success();
        assert_eq!(t.from, HealthState::Unhealthy);
        assert_eq!(t.to, HealthState::Healthy);
        assert_eq!(ep.consecutive_failures, 0);
    }

    #[test]
    fn test_upstream_target() {
        let mut ep = test_endpoint("alpha", 9000, 1, 1);
        ep.base_path = "/api/v2".to_string();
        assert_eq!(ep.upstream_target("/items", Some("x=1")), "/api/v2/items?x=1");
        assert_eq!(ep.upstream_target("items", None), "/api/v2/items");
        assert_eq!(ep.upstream_target("/", Some("")), "/api/v2/");
    }

    #[test]
    fn test_weight_is_at_least_one() {
        let ep = test_endpoint("alpha", 9000, 0, 1);
        assert_eq!(ep.weight, 1);
        assert_eq!(ep.id.to_string(), "alpha@127.0.0.1:9000");
    }
}
