//! Service registry.
//!
//! # Responsibilities
//! - Hold the static set of endpoints grouped by logical service name
//! - Apply the configured load balancing strategy to select an endpoint
//! - Apply health results under a single lock so transitions are linearizable

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::BalancingStrategy;
use crate::error::{ProxyError, Result};
use crate::health::state::{HealthState, HealthTransition};
use crate::load_balancer::{
    backend::{EndpointId, ServiceEndpoint},
    round_robin::{RoundRobin, WeightedRoundRobin},
    LoadBalancer,
};

#[derive(Debug)]
struct ServiceGroup {
    endpoints: Vec<ServiceEndpoint>,
    balancer: Box<dyn LoadBalancer>,
}

/// Manages endpoint groups and load balancing.
#[derive(Debug)]
pub struct ServiceRegistry {
    strategy: BalancingStrategy,
    groups: RwLock<HashMap<String, ServiceGroup>>,
}

impl ServiceRegistry {
    pub fn new(strategy: BalancingStrategy) -> Self {
        Self {
            strategy,
            groups: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceGroup>> {
        self.groups.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceGroup>> {
        self.groups.write().unwrap_or_else(|e| e.into_inner())
    }

    fn make_balancer(&self) -> Box<dyn LoadBalancer> {
        match self.strategy {
            BalancingStrategy::RoundRobin => Box::new(RoundRobin::new()),
            BalancingStrategy::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        }
    }

    /// Add an endpoint to its logical service, creating the group on first use.
    pub fn register(&self, endpoint: ServiceEndpoint) -> Result<()> {
        let mut groups = self.write();
        if !groups.contains_key(endpoint.name()) {
            let group = ServiceGroup {
                endpoints: Vec::new(),
                balancer: self.make_balancer(),
            };
            groups.insert(endpoint.name().to_string(), group);
        }
        let Some(group) = groups.get_mut(endpoint.name()) else {
            return Err(ProxyError::UnknownService(endpoint.name().to_string()));
        };
        if group.endpoints.iter().any(|e| e.id == endpoint.id) {
            return Err(ProxyError::DuplicateEndpoint(endpoint.id));
        }

        tracing::debug!(endpoint = %endpoint.id, weight = endpoint.weight, "Endpoint registered");
        group.endpoints.push(endpoint);
        Ok(())
    }

    /// All endpoints registered under `name`.
    pub fn get(&self, name: &str) -> Result<Vec<ServiceEndpoint>> {
        self.read()
            .get(name)
            .map(|g| g.endpoints.clone())
            .ok_or_else(|| ProxyError::UnknownService(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Every endpoint currently eligible for traffic.
    pub fn list_healthy(&self) -> Vec<ServiceEndpoint> {
        self.read()
            .values()
            .flat_map(|g| g.endpoints.iter())
            .filter(|e| e.is_healthy())
            .cloned()
            .collect()
    }

    /// Return a list of all endpoints (for health checking and pool setup).
    pub fn all_endpoints(&self) -> Vec<ServiceEndpoint> {
        let mut all: Vec<_> = self
            .read()
            .values()
            .flat_map(|g| g.endpoints.iter())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Select an endpoint of `name`.
    pub fn select(&self, name: &str) -> Result<ServiceEndpoint> {
        self.select_excluding(name, &[])
    }

    /// Select an endpoint of `name` that is not in `exclude`.
    pub fn select_excluding(&self, name: &str, exclude: &[EndpointId]) -> Result<ServiceEndpoint> {
        let groups = self.read();
        let group = groups
            .get(name)
            .ok_or_else(|| ProxyError::UnknownService(name.to_string()))?;

        match group.balancer.next_index(&group.endpoints, exclude) {
            Some(index) => Ok(group.endpoints[index].clone()),
            None => {
                tracing::debug!(
                    service = %name,
                    endpoint_count = group.endpoints.len(),
                    excluded = exclude.len(),
                    "No healthy endpoint found in group"
                );
                Err(ProxyError::NoHealthyBackend(name.to_string()))
            }
        }
    }

    /// Record a successful probe; resets the failure counter.
    pub fn mark_healthy(&self, id: &EndpointId) -> Result<HealthTransition> {
        self.update(id, ServiceEndpoint::record_success)
    }

    /// Record a failed probe; flips to unhealthy once the threshold is reached.
    pub fn mark_unhealthy(&self, id: &EndpointId) -> Result<HealthTransition> {
        self.update(id, ServiceEndpoint::record_failure)
    }

    fn update<F>(&self, id: &EndpointId, apply: F) -> Result<HealthTransition>
    where
        F: FnOnce(&mut ServiceEndpoint) -> HealthTransition,
    {
        let mut groups = self.write();
        groups
            .get_mut(&id.service)
            .and_then(|g| g.endpoints.iter_mut().find(|e| &e.id == id))
            .map(apply)
            .ok_or_else(|| ProxyError::UnknownService(id.to_string()))
    }

    /// Per-service health for the `/health` endpoint.
    ///
    /// A service is healthy while at least one of its endpoints is routable.
    pub fn health_summary(&self) -> BTreeMap<String, HealthState> {
        self.read()
            .iter()
            .map(|(name, group)| {
                let state = if group.endpoints.iter().any(|e| e.is_healthy()) {
                    HealthState::Healthy
                } else {
                    HealthState::Unhealthy
                };
                (name.clone(), state)
            })
            .collect()
    }
}
