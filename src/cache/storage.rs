//! Versioned-store backends for the offline cache.
//!
//! A backend holds named stores of (request key -> response snapshot)
//! entries. Writes are last-write-wins per key; invalidation is wholesale
//! per store, never per entry.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::types::CachedResponse;

/// Trait for versioned cache store backends.
pub trait StoreBackend: Send + Sync + 'static {
  /// Look up an entry by store name and request key.
  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Insert or overwrite an entry.
  fn put(&self, store: &str, key: &str, entry: &CachedResponse) -> Result<()>;

  /// Names of all stores that currently hold at least one entry.
  fn list_stores(&self) -> Result<Vec<String>>;

  /// Drop a whole store and every entry under it.
  fn delete_store(&self, store: &str) -> Result<()>;

  /// Request keys currently present in a store.
  fn keys(&self, store: &str) -> Result<Vec<String>>;
}

/// In-memory backend used in tests and as the reference implementation.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StoreBackend for MemoryStorage {
  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.get(store).and_then(|s| s.get(key)).cloned())
  }

  fn put(&self, store: &str, key: &str, entry: &CachedResponse) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    stores
      .entry(store.to_string())
      .or_default()
      .insert(key.to_string(), entry.clone());
    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.keys().cloned().collect())
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    stores.remove(store);
    Ok(())
  }

  fn keys(&self, store: &str) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      stores
        .get(store)
        .map(|s| s.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

/// SQLite-backed store implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open the storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("mihrab").join("cache.db"))
  }

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
}

/// Schema for the cache store table.
const CACHE_SCHEMA: &str = r#"
-- Named, versioned response stores (entries serialized as JSON)
CREATE TABLE IF NOT EXISTS cache_entries (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    entry BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_store ON cache_entries(store);
"#;

impl StoreBackend for SqliteStorage {
  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT entry FROM cache_entries WHERE store = ? AND request_key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let data: Option<Vec<u8>> = stmt.query_row(params![store, key], |row| row.get(0)).ok();

    match data {
      Some(data) => {
        let entry: CachedResponse = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cache entry: {}", e))?;
        Ok(Some(entry))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, key: &str, entry: &CachedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(entry).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (store, request_key, entry, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![store, key, data],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT store FROM cache_entries")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let stores: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(stores)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(())
  }

  fn keys(&self, store: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT request_key FROM cache_entries WHERE store = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys: Vec<String> = stmt
      .query_map(params![store], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::types::FetchResponse;

  fn entry(body: &str) -> CachedResponse {
    CachedResponse::now(&FetchResponse::new(200, body.as_bytes().to_vec()))
  }

  #[test]
  fn test_memory_storage_roundtrip() {
    let storage = MemoryStorage::new();
    storage.put("shell-v1", "k1", &entry("hello")).unwrap();

    let got = storage.get("shell-v1", "k1").unwrap().unwrap();
    assert_eq!(got.response.body, b"hello");
    assert!(storage.get("shell-v1", "missing").unwrap().is_none());
    assert!(storage.get("other", "k1").unwrap().is_none());
  }

  #[test]
  fn test_memory_storage_last_write_wins() {
    let storage = MemoryStorage::new();
    storage.put("runtime-v1", "k", &entry("old")).unwrap();
    storage.put("runtime-v1", "k", &entry("new")).unwrap();

    let got = storage.get("runtime-v1", "k").unwrap().unwrap();
    assert_eq!(got.response.body, b"new");
  }

  #[test]
  fn test_memory_storage_delete_store_drops_all_entries() {
    let storage = MemoryStorage::new();
    storage.put("shell-v1", "a", &entry("a")).unwrap();
    storage.put("shell-v1", "b", &entry("b")).unwrap();
    storage.put("runtime-v1", "c", &entry("c")).unwrap();

    storage.delete_store("shell-v1").unwrap();

    assert!(storage.get("shell-v1", "a").unwrap().is_none());
    assert!(storage.get("shell-v1", "b").unwrap().is_none());
    assert_eq!(storage.list_stores().unwrap(), vec!["runtime-v1".to_string()]);
  }

  #[test]
  fn test_sqlite_storage_roundtrip() {
    let dir = std::env::temp_dir().join(format!("mihrab-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cache-roundtrip.db");
    let _ = std::fs::remove_file(&path);

    let storage = SqliteStorage::open_at(&path).unwrap();
    storage.put("shell-v1", "k1", &entry("payload")).unwrap();

    let got = storage.get("shell-v1", "k1").unwrap().unwrap();
    assert_eq!(got.response.status, 200);
    assert_eq!(got.response.body, b"payload");

    let stores = storage.list_stores().unwrap();
    assert_eq!(stores, vec!["shell-v1".to_string()]);

    storage.delete_store("shell-v1").unwrap();
    assert!(storage.get("shell-v1", "k1").unwrap().is_none());

    let _ = std::fs::remove_file(&path);
  }
}
