use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

mod migrations;

use migrations::run_migrations;

/// Store keys shared by every writer and the reconcile poller.
///
/// Values are plain strings; the pomodoro and task entries hold JSON, the
/// active-task id and the panel-open flag are stored bare.
pub mod keys {
    pub const POMODORO_SETTINGS: &str = "pomodoroSettings";
    pub const LEARNING_TASKS: &str = "learningTasks";
    pub const LEARNING_ACTIVE_ID: &str = "learningActiveId";
    pub const LEARNING_RAW_TABLE: &str = "learningTasksRawTable";
    pub const ACTIVITY_PANEL_OPEN: &str = "activityPanelOpen";
}

enum Backend {
    Sqlite(Mutex<Connection>),
    /// Degraded mode when no backing file could be opened: reads return
    /// nothing, writes vanish. The rest of the app keeps working.
    Disabled,
}

/// Cloneable handle to the shared key-value store.
///
/// Every focusdeck process on the machine opens the same database file, so
/// the store doubles as the message bus between processes. There is no
/// locking above SQLite's own: callers do read-modify-write and accept that
/// two simultaneous writers can lose an update.
///
/// No operation here returns an error to the caller. Failures are logged and
/// surface as a missing value, which the poller already has to tolerate.
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<Backend>,
    path: Option<Arc<PathBuf>>,
}

impl KvStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;

        // WAL so other focusdeck processes can read while we write.
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("Failed to enable WAL mode: {err}");
        }
        if let Err(err) = conn.busy_timeout(std::time::Duration::from_millis(250)) {
            warn!("Failed to set busy timeout: {err}");
        }

        run_migrations(&mut conn).context("failed to run store migrations")?;

        info!("Store opened at {}", path.display());

        Ok(Self {
            backend: Arc::new(Backend::Sqlite(Mutex::new(conn))),
            path: Some(Arc::new(path.to_path_buf())),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        run_migrations(&mut conn).context("failed to run store migrations")?;
        Ok(Self {
            backend: Arc::new(Backend::Sqlite(Mutex::new(conn))),
            path: None,
        })
    }

    /// No-op handle used when the store location is unavailable.
    pub fn disabled() -> Self {
        Self {
            backend: Arc::new(Backend::Disabled),
            path: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(*self.backend, Backend::Disabled)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let Backend::Sqlite(conn) = &*self.backend else {
            return None;
        };
        let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        {
            Ok(value) => value,
            Err(err) => {
                error!("Store read failed for key '{key}': {err}");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        let Backend::Sqlite(conn) = &*self.backend else {
            return;
        };
        let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        ) {
            error!("Store write failed for key '{key}': {err}");
        }
    }

    pub fn remove(&self, key: &str) {
        let Backend::Sqlite(conn) = &*self.backend else {
            return;
        };
        let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = conn.execute("DELETE FROM kv WHERE key = ?1", params![key]) {
            error!("Store delete failed for key '{key}': {err}");
        }
    }

    /// Read a JSON-encoded value. Malformed JSON is treated as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Discarding malformed JSON under key '{key}': {err}");
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw),
            Err(err) => error!("Failed to serialize value for key '{key}': {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let store = KvStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing"), None);

        store.set("a", "1");
        assert_eq!(store.get("a").as_deref(), Some("1"));

        store.set("a", "2");
        assert_eq!(store.get("a").as_deref(), Some("2"));

        store.remove("a");
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn remove_absent_key_is_a_noop() {
        let store = KvStore::open_in_memory().unwrap();
        store.remove("never-set");
        assert_eq!(store.get("never-set"), None);
    }

    #[test]
    fn clones_share_the_same_data() {
        let store = KvStore::open_in_memory().unwrap();
        let other = store.clone();
        store.set("shared", "yes");
        assert_eq!(other.get("shared").as_deref(), Some("yes"));
    }

    #[test]
    fn disabled_store_swallows_everything() {
        let store = KvStore::disabled();
        assert!(store.is_disabled());
        store.set("a", "1");
        store.remove("a");
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn malformed_json_reads_as_absent() {
        let store = KvStore::open_in_memory().unwrap();
        store.set("broken", "{not json");
        let parsed: Option<Vec<String>> = store.get_json("broken");
        assert!(parsed.is_none());
        // The raw value is untouched.
        assert_eq!(store.get("broken").as_deref(), Some("{not json"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.sqlite3");
        {
            let store = KvStore::open(&path).unwrap();
            store.set("k", "v");
        }
        let store = KvStore::open(&path).unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }
}
