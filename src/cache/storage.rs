//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheSnapshot, Cacheable};

/// Storage key holding the serialized entry sequence.
pub const ENTRIES_KEY: &str = "feed-posts";
/// Storage key holding the RFC 3339 retrieval timestamp.
pub const TIMESTAMP_KEY: &str = "feed-timestamp";

/// Trait for cache storage backends.
///
/// A backend holds a single snapshot slot. Writers always write complete values;
/// there is no partial update of the entry sequence.
pub trait CacheStorage: Send + Sync {
  /// Get the cached snapshot. Returns `None` unless both entries and timestamp are present.
  fn get_snapshot<T: Cacheable>(&self) -> Result<Option<CacheSnapshot<T>>>;

  /// Replace entries and timestamp together.
  fn store_snapshot<T: Cacheable>(&self, snapshot: &CacheSnapshot<T>) -> Result<()>;

  /// Replace the entries, leaving the timestamp untouched.
  fn store_entries<T: Cacheable>(&self, entries: &[T]) -> Result<()>;

  /// Remove the snapshot entirely.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get_snapshot<T: Cacheable>(&self) -> Result<Option<CacheSnapshot<T>>> {
    Ok(None) // Always miss
  }

  fn store_snapshot<T: Cacheable>(&self, _snapshot: &CacheSnapshot<T>) -> Result<()> {
    Ok(()) // Discard
  }

  fn store_entries<T: Cacheable>(&self, _entries: &[T]) -> Result<()> {
    Ok(()) // Discard
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
///
/// Entries are kept in a small key-value table, partitioned by `scope` so that
/// one database file can hold snapshots for several post services.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  scope: String,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path, scope: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, scope)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory(scope: &str) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn, scope)
  }

  fn with_connection(conn: Connection, scope: &str) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
      scope: scope.to_string(),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn read_value(conn: &Connection, scope: &str, name: &str) -> Result<Option<String>> {
    conn
      .query_row(
        "SELECT value FROM cache_entries WHERE scope = ? AND name = ?",
        params![scope, name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", name, e))
  }

  fn write_value(conn: &Connection, scope: &str, name: &str, value: &str) -> Result<()> {
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (scope, name, value, written_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![scope, name, value],
      )
      .map_err(|e| eyre!("Failed to write cache entry {}: {}", name, e))?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per (scope, name); values are serialized JSON or RFC 3339 text
CREATE TABLE IF NOT EXISTS cache_entries (
    scope TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, name)
);
"#;

impl CacheStorage for SqliteStorage {
  fn get_snapshot<T: Cacheable>(&self) -> Result<Option<CacheSnapshot<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries = match Self::read_value(&conn, &self.scope, ENTRIES_KEY)? {
      Some(v) => v,
      None => return Ok(None),
    };
    let timestamp = match Self::read_value(&conn, &self.scope, TIMESTAMP_KEY)? {
      Some(v) => v,
      None => return Ok(None),
    };

    let entries: Vec<T> = serde_json::from_str(&entries)
      .map_err(|e| eyre!("Failed to deserialize cached entries: {}", e))?;
    let fetched_at = parse_timestamp(&timestamp)?;

    Ok(Some(CacheSnapshot {
      entries,
      fetched_at,
    }))
  }

  fn store_snapshot<T: Cacheable>(&self, snapshot: &CacheSnapshot<T>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries = serde_json::to_string(&snapshot.entries)
      .map_err(|e| eyre!("Failed to serialize entries: {}", e))?;
    let timestamp = format_timestamp(snapshot.fetched_at);

    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    Self::write_value(&tx, &self.scope, ENTRIES_KEY, &entries)?;
    Self::write_value(&tx, &self.scope, TIMESTAMP_KEY, &timestamp)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn store_entries<T: Cacheable>(&self, entries: &[T]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries =
      serde_json::to_string(entries).map_err(|e| eyre!("Failed to serialize entries: {}", e))?;
    Self::write_value(&conn, &self.scope, ENTRIES_KEY, &entries)
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE scope = ?",
        params![self.scope],
      )
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }
}

/// Format a timestamp as RFC 3339, keeping sub-second precision.
fn format_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse cached timestamp '{}': {}", s, e))
}
