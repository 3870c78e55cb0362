//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be repeated on another endpoint
//!
//! # Design Decisions
//! - Only upstream failures (connect, timeout, protocol) are retried
//! - Capacity errors (pool exhausted, no healthy backend) are never retried
//! - At most one retry per request to bound tail latency

use crate::config::RetryConfig;
use crate::error::ProxyError;

/// Hard ceiling regardless of configuration.
pub const MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRIES),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `attempt` counts from zero for the first try.
    pub fn should_retry(&self, error: &ProxyError, attempt: u32) -> bool {
        error.is_upstream_failure() && attempt < self.max_retries
    }
}
