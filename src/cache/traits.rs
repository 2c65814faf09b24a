//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be cached.
///
/// Implementors must provide a stable unique key, used to de-duplicate entries
/// when newer results are merged into a cached sequence.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g., post id)
  fn cache_key(&self) -> String;
}

/// The persisted state of a cached sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<T> {
  /// Cached entities, newest first
  pub entries: Vec<T>,
  /// When the sequence was last fully or incrementally retrieved
  pub fetched_at: DateTime<Utc>,
}

impl<T> CacheSnapshot<T> {
  pub fn new(entries: Vec<T>, fetched_at: DateTime<Utc>) -> Self {
    Self {
      entries,
      fetched_at,
    }
  }
}

/// Indicates where the currently published data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, within the stale window; a background revalidation may be running
  CacheFresh,
  /// Data from cache, past the stale window; a full fetch is pending or failed
  CacheStale,
}

impl CacheSource {
  pub fn is_cached(&self) -> bool {
    !matches!(self, CacheSource::Network)
  }
}
