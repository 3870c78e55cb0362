//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, thresholds bounded)
//! - Detect duplicate endpoints within a service
//! - Keep service names usable as cache key prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::cache::key::KEY_SEPARATOR;
use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config` and collect every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.listener.max_response_bytes == 0 {
        errors.push(ValidationError::new("listener.max_response_bytes", "must be > 0"));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    // Every attempt may spend the full connect and request budget.
    let attempts = u64::from(config.retries.max_retries) + 1;
    let upstream_budget = attempts
        .saturating_mul(config.timeouts.connect_secs.saturating_add(config.timeouts.request_secs));
    if config.timeouts.client_secs < upstream_budget {
        errors.push(ValidationError::new(
            "timeouts.client_secs",
            format!(
                "must be >= (retries.max_retries + 1) * (connect_secs + request_secs) = {}",
                upstream_budget
            ),
        ));
    }

    if config.retries.max_retries > 1 {
        errors.push(ValidationError::new("retries.max_retries", "at most one retry is allowed"));
    }

    if config.pool.max_connections == 0 {
        errors.push(ValidationError::new("pool.max_connections", "must be >= 1"));
    }
    if config.pool.keepalive_timeout_secs == 0 {
        errors.push(ValidationError::new("pool.keepalive_timeout_secs", "must be > 0"));
    }
    if config.pool.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("pool.sweep_interval_secs", "must be > 0"));
    }

    if config.cache.enabled {
        if config.cache.max_size == 0 {
            errors.push(ValidationError::new("cache.max_size", "must be >= 1"));
        }
        if config.cache.cleanup_interval_secs == 0 {
            errors.push(ValidationError::new("cache.cleanup_interval_secs", "must be > 0"));
        }
    }

    if config.services.is_empty() {
        errors.push(ValidationError::new("services", "at least one service is required"));
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = |name: &str| format!("services[{}].{}", i, name);

        if service.name.is_empty() || service.name.contains(['/', KEY_SEPARATOR]) {
            errors.push(ValidationError::new(
                field("name"),
                format!("must be non-empty and contain no '/' or '{}'", KEY_SEPARATOR),
            ));
        }
        if service.host.is_empty() {
            errors.push(ValidationError::new(field("host"), "must not be empty"));
        }
        if service.port == 0 {
            errors.push(ValidationError::new(field("port"), "must be non-zero"));
        }
        if service.weight == 0 {
            errors.push(ValidationError::new(field("weight"), "must be >= 1"));
        }
        if service.max_connections == Some(0) {
            errors.push(ValidationError::new(field("max_connections"), "must be >= 1"));
        }
        if !service.base_path.is_empty() && !service.base_path.starts_with('/') {
            errors.push(ValidationError::new(field("base_path"), "must start with '/'"));
        }
        if Url::parse(&format!("http://{}:{}{}", service.host, service.port, service.base_path)).is_err() {
            errors.push(ValidationError::new(field("host"), "does not form a valid base URL"));
        }
        if !seen.insert((service.name.as_str(), service.host.as_str(), service.port)) {
            errors.push(ValidationError::new(
                field("port"),
                format!("duplicate endpoint {}:{} for service {}", service.host, service.port, service.name),
            ));
        }

        let health = &service.health_check;
        if !health.path.starts_with('/') {
            errors.push(ValidationError::new(field("health_check.path"), "must start with '/'"));
        }
        if health.interval_secs == 0 {
            errors.push(ValidationError::new(field("health_check.interval_secs"), "must be > 0"));
        }
        if health.timeout_secs == 0 || health.timeout_secs > health.interval_secs {
            errors.push(ValidationError::new(
                field("health_check.timeout_secs"),
                "must be > 0 and not exceed the interval",
            ));
        }
        if !(1..=3).contains(&health.failure_threshold) {
            errors.push(ValidationError::new(field("health_check.failure_threshold"), "must be in 1..=3"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
