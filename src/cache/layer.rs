//! Cache layer that decides when a cached snapshot can be trusted.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use super::storage::CacheStorage;
use super::traits::{CacheSnapshot, Cacheable};

/// Minutes a snapshot is trusted before a full refresh is required.
pub const EXPIRY_WINDOW_MINUTES: i64 = 5;

/// Cache layer that manages staleness and snapshot persistence.
///
/// This layer sits between the synchronizer and the storage backend. It is the
/// only code that writes snapshots, and it always writes complete values.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(EXPIRY_WINDOW_MINUTES),
    }
  }

  /// Set the stale time for cached data.
  #[allow(dead_code)]
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on its fetched_at timestamp.
  pub fn is_stale(&self, fetched_at: DateTime<Utc>) -> bool {
    Utc::now() - fetched_at > self.stale_time
  }

  /// Read the current snapshot.
  ///
  /// An unreadable snapshot is reported and treated as a miss, so a corrupt
  /// cache degrades to a full fetch instead of blocking the feed.
  pub fn read<T: Cacheable>(&self) -> Option<CacheSnapshot<T>> {
    match self.storage.get_snapshot::<T>() {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(error = %e, "discarding unreadable feed cache");
        None
      }
    }
  }

  /// Overwrite the snapshot with a newly retrieved sequence.
  pub fn replace<T: Cacheable>(&self, entries: &[T], fetched_at: DateTime<Utc>) -> Result<()> {
    self
      .storage
      .store_snapshot(&CacheSnapshot::new(entries.to_vec(), fetched_at))
  }

  /// Overwrite the cached entries without touching fetched_at.
  pub fn patch<T: Cacheable>(&self, entries: &[T]) -> Result<()> {
    self.storage.store_entries(entries)
  }

  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
    }
  }
}

/// Merge a newest-first batch into a newest-first sequence.
///
/// Entries of `existing` whose key appears in `incoming` are dropped, then
/// `incoming` is prepended. Keys repeated inside `incoming` keep their first
/// (newest) occurrence. The relative order of surviving existing entries is
/// preserved; correctness of the overall order relies on `incoming` never
/// being older than the existing head.
pub fn merge_newest_first<T: Cacheable>(existing: &[T], incoming: Vec<T>) -> Vec<T> {
  let mut seen = HashSet::with_capacity(incoming.len());
  let mut merged = Vec::with_capacity(existing.len() + incoming.len());

  for entry in incoming {
    if seen.insert(entry.cache_key()) {
      merged.push(entry);
    }
  }

  merged.extend(
    existing
      .iter()
      .filter(|entry| !seen.contains(&entry.cache_key()))
      .cloned(),
  );

  merged
}
