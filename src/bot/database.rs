//! Persistent SQLite database for users, messages and per-user bot state.

use crate::bot::message::{IncomingMessage, Sender};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create database directory '{}': {source}", .path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("failed to open database '{}': {source}", .path.display())]
    Open { path: PathBuf, source: rusqlite::Error },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}

/// A user the bot has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub first_seen: String,
    pub last_seen: String,
    pub message_count: u32,
}

/// A logged text message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub timestamp: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub users: usize,
    pub messages: usize,
}

/// Persistent SQLite database for the bot.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::CreateDir { path: parent.to_path_buf(), source: e })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Open { path: path.to_path_buf(), source: e })?;
        let db = Self::from_connection(conn)?;

        let counts = db.counts()?;
        info!("Loaded database from {:?} ({} users, {} messages)", path, counts.users, counts.messages);
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                text TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE TABLE IF NOT EXISTS user_state (
                user_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id);
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
        "#)?;
        Ok(())
    }

    // ==================== USER METHODS ====================

    /// Insert the user or refresh its names and `last_seen`.
    ///
    /// `first_seen` only moves earlier and `last_seen` only moves later, so an
    /// old message arriving late never rewinds either.
    pub fn touch_user(&self, sender: &Sender, now: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        upsert_user(&conn, sender, now)?;
        Ok(())
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT user_id, username, first_name, first_seen, last_seen, message_count
                 FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        first_name: row.get(2)?,
                        first_seen: row.get(3)?,
                        last_seen: row.get(4)?,
                        message_count: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ==================== MESSAGE METHODS ====================

    /// Log a message and bump the sender's counter.
    ///
    /// Returns `false` when the message was already stored (re-delivered
    /// update); the counter is left untouched in that case.
    pub fn record_message(&self, msg: &IncomingMessage) -> Result<bool, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        upsert_user(&tx, &msg.sender, &msg.timestamp)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO messages (chat_id, message_id, user_id, timestamp, text)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![msg.chat_id, msg.message_id, msg.sender.user_id, msg.timestamp, msg.text],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE users SET message_count = message_count + 1 WHERE user_id = ?1",
                params![msg.sender.user_id],
            )?;
        } else {
            debug!("Message {} in chat {} already stored", msg.message_id, msg.chat_id);
        }

        tx.commit()?;
        Ok(inserted > 0)
    }

    /// Most recent messages in a chat, newest first.
    pub fn recent_messages(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT chat_id, message_id, user_id, timestamp, text
             FROM messages WHERE chat_id = ?1
             ORDER BY timestamp DESC, message_id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![chat_id, limit as i64], |row| {
            Ok(StoredMessage {
                chat_id: row.get(0)?,
                message_id: row.get(1)?,
                user_id: row.get(2)?,
                timestamp: row.get(3)?,
                text: row.get(4)?,
            })
        })?;
        let messages = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    // ==================== STATE METHODS ====================

    pub fn set_state(&self, user_id: i64, key: &str, value: &str, now: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_state (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, key, value, now],
        )?;
        Ok(())
    }

    pub fn get_state(&self, user_id: i64, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM user_state WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Remove a state key. Returns whether it existed.
    pub fn delete_state(&self, user_id: i64, key: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM user_state WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
        )?;
        Ok(removed > 0)
    }

    // ==================== HEALTH ====================

    pub fn counts(&self) -> Result<Counts, StorageError> {
        let conn = self.lock()?;
        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let messages: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(Counts { users: users as usize, messages: messages as usize })
    }

    /// Cheap liveness check.
    pub fn ping(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
impl Database {
    /// Poison the connection mutex so every later call fails with `LockPoisoned`.
    pub(crate) fn poison_lock(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.conn.lock();
                panic!("poisoning database lock");
            })
            .join()
        });
    }
}

fn upsert_user(conn: &Connection, sender: &Sender, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO users (user_id, username, first_name, first_seen, last_seen, message_count)
         VALUES (?1, ?2, ?3, ?4, ?4, 0)
         ON CONFLICT(user_id) DO UPDATE SET
            username = ?2,
            first_name = ?3,
            first_seen = MIN(first_seen, ?4),
            last_seen = MAX(last_seen, ?4)",
        params![sender.user_id, sender.username, sender.first_name, now],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(user_id: i64, username: &str) -> Sender {
        Sender { user_id, username: Some(username.to_string()), first_name: username.to_uppercase() }
    }

    fn make_msg(chat_id: i64, id: i64, user_id: i64, timestamp: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: id,
            chat_id,
            sender: sender(user_id, "alice"),
            timestamp: timestamp.to_string(),
            text: text.to_string(),
            is_private: false,
        }
    }

    #[test]
    fn test_record_message_creates_user() {
        let db = Database::in_memory().unwrap();
        assert!(db.record_message(&make_msg(-1, 1, 100, "2024-01-15 10:00:00", "hello")).unwrap());

        let user = db.get_user(100).unwrap().expect("user should exist");
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.message_count, 1);
        assert_eq!(user.first_seen, "2024-01-15 10:00:00");
        assert_eq!(db.counts().unwrap(), Counts { users: 1, messages: 1 });
    }

    #[test]
    fn test_redelivered_message_not_double_counted() {
        let db = Database::in_memory().unwrap();
        let msg = make_msg(-1, 1, 100, "2024-01-15 10:00:00", "hello");
        assert!(db.record_message(&msg).unwrap());
        assert!(!db.record_message(&msg).unwrap());

        assert_eq!(db.get_user(100).unwrap().unwrap().message_count, 1);
        assert_eq!(db.counts().unwrap().messages, 1);
    }

    #[test]
    fn test_same_message_id_in_different_chats() {
        let db = Database::in_memory().unwrap();
        db.record_message(&make_msg(-1, 7, 100, "2024-01-15 10:00:00", "a")).unwrap();
        db.record_message(&make_msg(-2, 7, 100, "2024-01-15 10:01:00", "b")).unwrap();
        assert_eq!(db.get_user(100).unwrap().unwrap().message_count, 2);
    }

    #[test]
    fn test_touch_user_keeps_first_seen_and_count() {
        let db = Database::in_memory().unwrap();
        db.record_message(&make_msg(-1, 1, 100, "2024-01-15 10:00:00", "hi")).unwrap();

        let renamed = Sender { user_id: 100, username: Some("alice2".into()), first_name: "Al".into() };
        db.touch_user(&renamed, "2024-02-01 09:00:00").unwrap();

        let user = db.get_user(100).unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("alice2"));
        assert_eq!(user.first_name, "Al");
        assert_eq!(user.first_seen, "2024-01-15 10:00:00");
        assert_eq!(user.last_seen, "2024-02-01 09:00:00");
        assert_eq!(user.message_count, 1);
    }

    #[test]
    fn test_late_message_does_not_rewind_last_seen() {
        let db = Database::in_memory().unwrap();
        db.touch_user(&sender(100, "alice"), "2024-02-01 09:00:00").unwrap();
        db.record_message(&make_msg(-1, 1, 100, "2024-01-15 10:00:00", "sent earlier")).unwrap();

        let user = db.get_user(100).unwrap().unwrap();
        assert_eq!(user.last_seen, "2024-02-01 09:00:00");
        assert_eq!(user.first_seen, "2024-01-15 10:00:00");
        assert!(user.first_seen <= user.last_seen);
        assert_eq!(user.message_count, 1);
    }

    #[test]
    fn test_message_count_out_of_range_is_an_error() {
        let db = Database::in_memory().unwrap();
        db.touch_user(&sender(100, "alice"), "2024-01-15 10:00:00").unwrap();
        db.lock()
            .unwrap()
            .execute("UPDATE users SET message_count = -1 WHERE user_id = 100", [])
            .unwrap();

        assert!(matches!(db.get_user(100), Err(StorageError::Sqlite(_))));
    }

    #[test]
    fn test_get_unknown_user() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_user(999).unwrap().is_none());
    }

    #[test]
    fn test_recent_messages_newest_first() {
        let db = Database::in_memory().unwrap();
        db.record_message(&make_msg(-1, 1, 100, "2024-01-15 10:00:00", "first")).unwrap();
        db.record_message(&make_msg(-1, 2, 100, "2024-01-15 10:05:00", "second")).unwrap();
        db.record_message(&make_msg(-1, 3, 100, "2024-01-15 10:10:00", "third")).unwrap();
        db.record_message(&make_msg(-9, 4, 100, "2024-01-15 10:20:00", "elsewhere")).unwrap();

        let recent = db.recent_messages(-1, 2).unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second"]);
    }

    #[test]
    fn test_state_is_per_user() {
        let db = Database::in_memory().unwrap();
        db.set_state(1, "quiet", "on", "2024-01-15 10:00:00").unwrap();
        db.set_state(2, "quiet", "off", "2024-01-15 10:00:00").unwrap();

        assert_eq!(db.get_state(1, "quiet").unwrap().as_deref(), Some("on"));
        assert_eq!(db.get_state(2, "quiet").unwrap().as_deref(), Some("off"));
        assert!(db.get_state(3, "quiet").unwrap().is_none());
    }

    #[test]
    fn test_state_overwrite_and_delete() {
        let db = Database::in_memory().unwrap();
        db.set_state(1, "k", "v1", "2024-01-15 10:00:00").unwrap();
        db.set_state(1, "k", "v2", "2024-01-15 10:01:00").unwrap();
        assert_eq!(db.get_state(1, "k").unwrap().as_deref(), Some("v2"));

        assert!(db.delete_state(1, "k").unwrap());
        assert!(!db.delete_state(1, "k").unwrap());
        assert!(db.get_state(1, "k").unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("roost.db");

        {
            let db = Database::open(&path).unwrap();
            db.record_message(&make_msg(-1, 1, 100, "2024-01-15 10:00:00", "kept")).unwrap();
            db.set_state(100, "quiet", "on", "2024-01-15 10:00:00").unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.counts().unwrap(), Counts { users: 1, messages: 1 });
        assert_eq!(db.get_state(100, "quiet").unwrap().as_deref(), Some("on"));
    }

    #[test]
    fn test_ping() {
        let db = Database::in_memory().unwrap();
        assert!(db.ping().is_ok());
    }

    #[test]
    fn test_poisoned_lock_fails_every_call() {
        let db = Database::in_memory().unwrap();
        db.poison_lock();
        assert!(matches!(db.ping(), Err(StorageError::LockPoisoned)));
        assert!(matches!(db.counts(), Err(StorageError::LockPoisoned)));
    }
}
