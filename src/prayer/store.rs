//! Persisted local state: day-keyed time tables and small key/value markers.
//!
//! Tables are superseded, never mutated: each calendar day gets its own row
//! and the newest fetch for a date wins.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::types::PrayerTimeTable;

/// Meta key gating the once-per-day provider fetch.
const META_LAST_FETCH_DATE: &str = "last_fetch_date";
/// Meta key recording when the install prompt was dismissed.
const META_INSTALL_PROMPT_DISMISSED_AT: &str = "install_prompt_dismissed_at";

/// SQLite store for time tables and shared local-state markers.
pub struct TimetableStore {
  conn: Mutex<Connection>,
}

impl TimetableStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open timetable database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open timetable database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// In-memory store for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("mihrab").join("timetable.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run timetable migrations: {}", e))?;

    Ok(())
  }

  /// Load the stored table for a calendar date.
  pub fn get(&self, date: NaiveDate) -> Result<Option<PrayerTimeTable>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT payload FROM timetable WHERE date_for = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let data: Option<Vec<u8>> = stmt
      .query_row(params![date.to_string()], |row| row.get(0))
      .ok();

    match data {
      Some(data) => {
        let table: PrayerTimeTable = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize time table: {}", e))?;
        Ok(Some(table))
      }
      None => Ok(None),
    }
  }

  /// Store (or supersede) the table for its calendar date.
  pub fn put(&self, table: &PrayerTimeTable) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(table).map_err(|e| eyre!("Failed to serialize time table: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO timetable (date_for, payload, fetched_at)
         VALUES (?, ?, datetime('now'))",
        params![table.date_for.to_string(), data],
      )
      .map_err(|e| eyre!("Failed to store time table: {}", e))?;

    Ok(())
  }

  /// Date of the last successful provider fetch, if recorded.
  pub fn last_fetch_date(&self) -> Result<Option<NaiveDate>> {
    Ok(
      self
        .get_meta(META_LAST_FETCH_DATE)?
        .and_then(|v| v.parse().ok()),
    )
  }

  pub fn set_last_fetch_date(&self, date: NaiveDate) -> Result<()> {
    self.set_meta(META_LAST_FETCH_DATE, &date.to_string())
  }

  /// When the onboarding/install prompt was dismissed (RFC 3339), if ever.
  pub fn install_prompt_dismissed_at(&self) -> Result<Option<String>> {
    self.get_meta(META_INSTALL_PROMPT_DISMISSED_AT)
  }

  pub fn set_install_prompt_dismissed_at(&self, timestamp: &str) -> Result<()> {
    self.set_meta(META_INSTALL_PROMPT_DISMISSED_AT, timestamp)
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM meta WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    Ok(stmt.query_row(params![key], |row| row.get(0)).ok())
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store meta value: {}", e))?;

    Ok(())
  }
}

/// Schema for the timetable and local-state tables.
const STORE_SCHEMA: &str = r#"
-- One row per calendar day; superseded on re-fetch, never edited in place
CREATE TABLE IF NOT EXISTS timetable (
    date_for TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Small key/value markers shared by both subsystems
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
