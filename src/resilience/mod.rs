//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce the per-request deadline)
//!     → On failure: retries.rs (retry once on another endpoint if allowed)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream exchange has a deadline
//! - No backoff or queueing: a thin proxy fails fast and lets callers retry

pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::with_timeout;
