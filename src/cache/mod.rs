//! Cache module for storing generated AI responses
//!
//! This module provides a TTL cache that keeps responses in memory with per-entry
//! expiry and persists the whole cache to a JSON snapshot on disk in the background.
//! It supports graceful degradation by letting callers read expired entries on
//! demand, allowing the application to serve stale data when the generator is
//! unavailable.

mod store;

pub use store::{CacheStats, CacheStore, CachedData};
