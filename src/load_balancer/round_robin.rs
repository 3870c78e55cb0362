//! Round-robin load balancing strategies.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{backend::{EndpointId, ServiceEndpoint}, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints, ignoring weights.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_index(&self, endpoints: &[ServiceEndpoint], exclude: &[EndpointId]) -> Option<usize> {
        if endpoints.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = endpoints.len();

        (0..len)
            .map(|i| (start + i) % len)
            .find(|&index| is_eligible(&endpoints[index], exclude))
    }
}

/// Weighted round-robin selector.
///
/// Each endpoint occupies `weight` consecutive virtual slots; the cursor walks
/// the slots and skips ineligible endpoints, so an endpoint with weight 3
/// receives three times the traffic of a weight-1 peer.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    counter: AtomicUsize,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a virtual slot to the endpoint index owning it.
    fn slot_owner(endpoints: &[ServiceEndpoint], mut slot: usize) -> usize {
        for (index, endpoint) in endpoints.iter().enumerate() {
            let weight = endpoint.weight.max(1) as usize;
            if slot < weight {
                return index;
            }
            slot -= weight;
        }
        endpoints.len() - 1
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next_index(&self, endpoints: &[ServiceEndpoint], exclude: &[EndpointId]) -> Option<usize> {
        if endpoints.is_empty() {
            return None;
        }

        let total: usize = endpoints.iter().map(|e| e.weight.max(1) as usize).sum();
        let start = self.counter.fetch_add(1, Ordering::Relaxed);

        // Walking every slot once visits every endpoint at least once.
        (0..total)
            .map(|i| Self::slot_owner(endpoints, (start + i) % total))
            .find(|&index| is_eligible(&endpoints[index], exclude))
    }
}

fn is_eligible(endpoint: &ServiceEndpoint, exclude: &[EndpointId]) -> bool {
    endpoint.is_healthy() && !exclude.contains(&endpoint.id)
}
