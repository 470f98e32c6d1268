//! SQLite-backed local durable cache.
//!
//! The cache lives at `~/.weekplan/cache.db` and is the always-available
//! fallback tier: every save lands here first, and every remote read is
//! mirrored here. Keys follow the original planner namespacing
//! (`weeklyPlanner-{weekKey}`, `weeklyPlanner-structure`,
//! `weeklyReview-{weekKey}`, `reminderSettings`); values are JSON.
//!
//! Reads and writes are atomic at single-key granularity. There are no
//! cross-key transactions.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::week::WeekKey;

/// Key prefix for per-week planner documents.
pub const PLAN_KEY_PREFIX: &str = "weeklyPlanner-";
/// Key for the structure template.
pub const STRUCTURE_KEY: &str = "weeklyPlanner-structure";
/// Key prefix for review snapshots.
pub const REVIEW_KEY_PREFIX: &str = "weeklyReview-";
/// Key for reminder preferences.
pub const REMINDER_SETTINGS_KEY: &str = "reminderSettings";

/// Cache key for a week's planner document.
pub fn plan_key(week_key: &WeekKey) -> String {
    format!("{}{}", PLAN_KEY_PREFIX, week_key)
}

/// Cache key for a week's review snapshot.
pub fn review_key(week_key: &WeekKey) -> String {
    format!("{}{}", REVIEW_KEY_PREFIX, week_key)
}

/// Errors specific to cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create cache directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("Failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
}

/// Keyed JSON store backed by a single SQLite table.
///
/// The connection is held behind a `std::sync::Mutex` so the cache can be
/// shared as `Arc<PlannerCache>` across async tasks; every call is a short
/// synchronous statement.
pub struct PlannerCache {
    conn: Mutex<Connection>,
}

impl PlannerCache {
    /// Open (or create) the cache at `~/.weekplan/cache.db`.
    pub fn open() -> Result<Self, CacheError> {
        Self::open_at(Self::cache_path()?)
    }

    /// Open a cache at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(CacheError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn cache_path() -> Result<PathBuf, CacheError> {
        let home = dirs::home_dir().ok_or(CacheError::HomeDirNotFound)?;
        Ok(home.join(".weekplan").join("cache.db"))
    }

    /// Raw string value for a key.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store a raw string value, replacing any prior value for the key.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Deserialize the value stored under `key`.
    ///
    /// Malformed JSON is treated as absent: the read path must fail open to
    /// an empty state, never crash.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Discarding malformed cache entry {key}: {e}");
                Ok(None)
            }
        }
    }

    /// Serialize and store a value under `key`.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        self.set_raw(key, &raw)
    }

    /// Remove a single key. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// All keys starting with `prefix`, sorted ascending.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt =
            conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key ASC")?;
        let keys = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Delete every key starting with `prefix`. Returns the number removed.
    pub fn purge_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let removed = conn.execute(
            "DELETE FROM kv WHERE key LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Create a temporary cache for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test. Test temp dirs are cleaned up by the OS.
    pub(crate) fn test_cache() -> PlannerCache {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test_cache.db");
        std::mem::forget(dir);
        PlannerCache::open_at(path).expect("Failed to open test cache")
    }

    #[test]
    fn test_set_and_get_roundtrip() {
        let cache = test_cache();
        cache.set_raw("weeklyPlanner-week-2024-06-09", "{}").unwrap();
        assert_eq!(
            cache.get_raw("weeklyPlanner-week-2024-06-09").unwrap(),
            Some("{}".to_string())
        );
        assert_eq!(cache.get_raw("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_prior_value() {
        let cache = test_cache();
        cache.set_raw("k", "a").unwrap();
        cache.set_raw("k", "b").unwrap();
        assert_eq!(cache.get_raw("k").unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_malformed_json_reads_as_absent() {
        let cache = test_cache();
        cache.set_raw("bad", "{not json").unwrap();
        let value: Option<crate::types::ReminderSettings> = cache.get_json("bad").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_prefix_scan_and_purge() {
        let cache = test_cache();
        cache.set_raw("weeklyPlanner-week-2024-06-09", "{}").unwrap();
        cache.set_raw("weeklyPlanner-week-2024-06-16", "{}").unwrap();
        cache.set_raw("weeklyReview-week-2024-06-09", "{}").unwrap();
        cache.set_raw("reminderSettings", "{}").unwrap();

        let keys = cache.keys_with_prefix(PLAN_KEY_PREFIX).unwrap();
        assert_eq!(keys.len(), 2);

        let removed = cache.purge_prefix(PLAN_KEY_PREFIX).unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get_raw("weeklyPlanner-week-2024-06-09").unwrap().is_none());
        // Other namespaces untouched.
        assert!(cache.get_raw("weeklyReview-week-2024-06-09").unwrap().is_some());
        assert!(cache.get_raw("reminderSettings").unwrap().is_some());
    }

    #[test]
    fn test_key_helpers() {
        let key = WeekKey::for_date(NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        assert_eq!(plan_key(&key), "weeklyPlanner-week-2024-06-09");
        assert_eq!(review_key(&key), "weeklyReview-week-2024-06-09");
    }
}
