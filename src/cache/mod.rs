//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! cacheable GET
//!     → key.rs (service prefix + digest of whitelisted params)
//!     → store.rs (ResponseCache::get, lazily expiring)
//!     → on miss: upstream response → ResponseCache::set (LRU eviction)
//!
//! background: sweeper.rs purges expired entries every cleanup interval
//! startup/shutdown: snapshot.rs loads/saves live entries
//! ```
//!
//! # Design Decisions
//! - One mutex for the whole store; no awaits while it is held
//! - Corrupt entries are purged and treated as misses
//! - Snapshots are best effort and never block startup

pub mod entry;
pub mod key;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod sweeper;

pub use entry::{CacheEntry, CachedResponse};
pub use key::{derive_key, service_prefix, KeyInput};
pub use stats::CacheStats;
pub use store::ResponseCache;
