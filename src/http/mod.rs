//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handlers)
//!     → request.rs (request ID, hop-by-hop filtering)
//!     → routing::ProxyRouter (cache, selection, upstream call)
//!     → response.rs (routing headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::{CacheStatus, ProxyResponse};
pub use server::{AppState, ProxyServer};
