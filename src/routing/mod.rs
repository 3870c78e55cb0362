//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (service, method, path, query, headers, body)
//!     → router.rs cache_key (GET + cache enabled for the service)
//!     → ResponseCache::get → HIT: return immediately
//!     → ServiceRegistry::select_excluding → RoutingDecision
//!     → PoolManager::acquire → forward under the request timeout
//!     → ResponseCache::set (2xx only) → Checkout::release
//!     → On upstream failure: retry once on another endpoint, else 502
//! ```
//!
//! # Design Decisions
//! - Built once at startup from the validated config, immutable afterwards
//! - Deterministic error mapping: 404 unknown, 503 capacity, 502 upstream

pub mod router;

pub use router::{ProxyRequest, ProxyRouter, RoutingDecision};
