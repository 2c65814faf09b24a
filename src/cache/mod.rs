//! Generic snapshot cache for offline-first lists.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Persists a single ordered snapshot plus the time it was retrieved
//! - Decides whether that snapshot is still trusted (stale window)
//! - Merges newer, newest-first batches into the cached sequence by key

mod layer;
mod storage;
mod traits;

pub use layer::{merge_newest_first, CacheLayer};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheSnapshot, CacheSource, Cacheable};
