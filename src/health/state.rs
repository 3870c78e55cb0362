//! Backend health state machine.
//!
//! # States
//! - Unknown: not probed yet, still receives traffic
//! - Healthy: backend receives traffic
//! - Unhealthy: backend excluded from load balancing
//!
//! # State Transitions
//! ```text
//! Unknown → Healthy:    probe succeeds
//! Healthy → Unhealthy:  consecutive failures >= failure_threshold
//! Unhealthy → Healthy:  one successful probe (failure counter reset to 0)
//! ```

use std::fmt;

use serde::Serialize;

use crate::load_balancer::backend::EndpointId;

/// Health State enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthState {
    /// Unknown endpoints are routable until a probe says otherwise.
    pub fn is_routable(self) -> bool {
        self != HealthState::Unhealthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying one probe result to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub endpoint: EndpointId,
    pub from: HealthState,
    pub to: HealthState,
    pub consecutive_failures: u32,
}

impl HealthTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Emit the transition as a structured event. No-op when nothing changed.
    pub fn log(&self) {
        if !self.changed() {
            return;
        }
        match self.to {
            HealthState::Unhealthy => tracing::warn!(
                endpoint = %self.endpoint,
                from = %self.from,
                to = %self.to,
                consecutive_failures = self.consecutive_failures,
                "Endpoint health changed"
            ),
            _ => tracing::info!(
                endpoint = %self.endpoint,
                from = %self.from,
                to = %self.to,
                consecutive_failures = self.consecutive_failures,
                "Endpoint health changed"
            ),
        }
    }
}
