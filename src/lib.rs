//! Health-aware HTTP reverse proxy with pooled upstream connections and a
//! TTL/LRU response cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::ProxyServer;
pub use lifecycle::{ProxyContext, Shutdown};
