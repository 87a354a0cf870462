//! On-device persistence for the message snapshot, the outbox and sync bookkeeping.
//!
//! One SQLite key/value table. Each logical item lives under its own key and is written
//! with a single statement, so a write either lands whole or not at all and a damaged
//! value under one key cannot affect the others.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, SyncError};
use crate::model::{Message, PendingMessage};

const MESSAGES_CACHE_KEY: &str = "messages_cache";
const PENDING_MESSAGES_KEY: &str = "pending_messages";
const LAST_SYNC_KEY: &str = "last_sync_timestamp";
const READ_CURSOR_KEY_PREFIX: &str = "read_cursor:";

#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    pub fn open(data_dir: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let path = Path::new(data_dir).join("tern_cache.sqlite3");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ── Message snapshot ─────────────────────────────────────────────────

    /// Replace the snapshot wholesale.
    pub fn save(&self, messages: &[Message]) -> Result<(), StorageError> {
        self.put_json(MESSAGES_CACHE_KEY, messages)
    }

    pub fn load(&self) -> Vec<Message> {
        self.get_json(MESSAGES_CACHE_KEY).unwrap_or_default()
    }

    // ── Outbox ───────────────────────────────────────────────────────────

    pub fn save_outbox(&self, pending: &[PendingMessage]) -> Result<(), StorageError> {
        self.put_json(PENDING_MESSAGES_KEY, pending)
    }

    pub fn load_outbox(&self) -> Vec<PendingMessage> {
        self.get_json(PENDING_MESSAGES_KEY).unwrap_or_default()
    }

    /// Returns whether an entry was removed.
    pub fn remove_from_outbox(&self, temp_id: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                [PENDING_MESSAGES_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let mut pending: Vec<PendingMessage> = match raw {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                let err = SyncError::CacheCorrupt(e.to_string());
                tracing::warn!(%err, key = PENDING_MESSAGES_KEY, "dropping unreadable outbox");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let before = pending.len();
        pending.retain(|p| p.temp_id != temp_id);
        let removed = pending.len() != before;
        tx.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![PENDING_MESSAGES_KEY, serde_json::to_string(&pending)?],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    // ── Sync bookkeeping ─────────────────────────────────────────────────

    pub fn save_last_sync(&self, at_millis: i64) -> Result<(), StorageError> {
        self.put_json(LAST_SYNC_KEY, &at_millis)
    }

    pub fn load_last_sync(&self) -> Option<i64> {
        self.get_json(LAST_SYNC_KEY)
    }

    pub fn save_read_cursor(&self, user_id: &str, message_id: u64) -> Result<(), StorageError> {
        self.put_json(&format!("{READ_CURSOR_KEY_PREFIX}{user_id}"), &message_id)
    }

    pub fn load_read_cursor(&self, user_id: &str) -> Option<u64> {
        self.get_json(&format!("{READ_CURSOR_KEY_PREFIX}{user_id}"))
    }

    /// Delete everything (used on sign-out).
    pub fn clear(&self) -> Result<(), StorageError> {
        self.conn.lock().execute("DELETE FROM kv", [])?;
        Ok(())
    }

    // ── Raw access ───────────────────────────────────────────────────────

    fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.conn.lock().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, json],
        )?;
        Ok(())
    }

    /// Read failures and unparseable values are logged and read as absent.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw: Option<String> = match self
            .conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%e, key, "failed to read from cache db");
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                let err = SyncError::CacheCorrupt(e.to_string());
                tracing::warn!(%err, key, "ignoring unreadable cache entry");
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &str) {
        self.conn
            .lock()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .unwrap();
    }
}
