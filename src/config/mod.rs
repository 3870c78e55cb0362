//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, env overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - Config is loaded once; the service set is static for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid config is the only fatal error class

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BalancerConfig, BalancingStrategy, CacheConfig, HealthCheckConfig, ListenerConfig,
    ObservabilityConfig, PoolConfig, ProxyConfig, RetryConfig, ServiceCacheConfig, ServiceConfig,
    ServiceHealthConfig, TimeoutConfig,
};
