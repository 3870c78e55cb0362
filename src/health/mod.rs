//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Per-endpoint timer
//!     → GET health path with timeout
//!     → ServiceRegistry::mark_healthy / mark_unhealthy
//!
//! State machine (state.rs):
//!     Unknown → Healthy ⇄ Unhealthy
//!     Failure threshold before leaving Healthy
//! ```
//!
//! # Design Decisions
//! - Probes run on their own schedule, never on request-serving tasks
//! - The monitor only writes registry state
//! - Health state is per-endpoint, not per-service

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthState, HealthTransition};
