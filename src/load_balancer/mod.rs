//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! /service/{name}/... → logical service name
//!     → registry.rs (endpoint group for the name)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (RoundRobin: rotate through endpoints)
//!         - round_robin.rs (WeightedRoundRobin: rotate through weight slots)
//!     → backend.rs (selected ServiceEndpoint snapshot)
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless apart from a cursor; the registry owns endpoints
//! - One strategy instance per logical service
//! - Unhealthy and already-tried endpoints excluded from selection

pub mod backend;
pub mod registry;
pub mod round_robin;

use crate::load_balancer::backend::{EndpointId, ServiceEndpoint};

/// Endpoint selection policy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the next endpoint to use, skipping unhealthy and excluded ones.
    fn next_index(&self, endpoints: &[ServiceEndpoint], exclude: &[EndpointId]) -> Option<usize>;
}

pub use registry::ServiceRegistry;
