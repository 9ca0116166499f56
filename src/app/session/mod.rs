//! Ephemeral per-user session storage
//!
//! Holds the data a user's follow-up actions refer back to (the last search results,
//! a favorites listing, a chart page) for a limited time. Nothing here is persisted.
//!
//! - [`config`] - TTL and sharding settings
//! - [`cache`] - The sharded TTL store

pub mod cache;
pub mod config;

pub use cache::{CacheEntry, SessionCache, SessionCacheStats, SessionKey, SessionScope};
pub use config::SessionConfig;
