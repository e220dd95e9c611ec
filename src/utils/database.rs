//! SQLite-backed store for bot statistics and the direct messages users send
//! to the bot.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};
use serenity::all::UserId;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// The default filename for the SQLite database.
pub const APPDATA_DB: &str = "application_data.db";

/// Messages kept per user; older ones are pruned on insert.
pub const MAX_DMS_PER_USER: usize = 100;
pub const DEFAULT_DM_LIMIT: usize = 50;

pub const STAT_COMMANDS_EXECUTED: &str = "commandsExecuted";
pub const STAT_BOT_STARTS: &str = "botStarts";
pub const STAT_DMS_RECEIVED: &str = "dmsReceived";

/// A direct message as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDm {
    pub username: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub struct DataStore {
    conn: Mutex<Connection>,
}

impl DataStore {
    pub fn open(path: impl AsRef<Path>) -> SqlResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stats (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS direct_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                content TEXT NOT NULL,
                attachments TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS direct_messages_user ON direct_messages (user_id, id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `increment` to a counter, creating it at zero first.
    pub fn update_stat(&self, name: &str, increment: i64) -> SqlResult<()> {
        self.conn().execute(
            "INSERT INTO stats (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
            params![name, increment],
        )?;
        Ok(())
    }

    pub fn stat(&self, name: &str) -> SqlResult<i64> {
        let value = self
            .conn()
            .query_row("SELECT value FROM stats WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    pub fn stats(&self) -> SqlResult<BTreeMap<String, i64>> {
        let conn = self.conn();
        let mut statement = conn.prepare("SELECT name, value FROM stats")?;
        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Records a direct message, keeping only the newest [`MAX_DMS_PER_USER`].
    pub fn save_dm(&self, user_id: UserId, username: &str, content: &str, attachments: &[String]) -> SqlResult<()> {
        let attachments = serde_json::to_string(attachments)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO direct_messages (user_id, username, content, attachments, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id.get() as i64,
                username,
                content,
                attachments,
                Utc::now().to_rfc3339()
            ],
        )?;
        let pruned = tx.execute(
            "DELETE FROM direct_messages WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM direct_messages WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            )",
            params![user_id.get() as i64, MAX_DMS_PER_USER as i64],
        )?;
        tx.commit()?;

        if pruned > 0 {
            debug!("Pruned {} old DMs from user {}", pruned, user_id);
        }
        Ok(())
    }

    /// A user's stored messages, newest first.
    pub fn dms(&self, user_id: UserId, limit: usize) -> SqlResult<Vec<StoredDm>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT username, content, attachments, created_at FROM direct_messages
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = statement.query_map(params![user_id.get() as i64, limit as i64], |row| {
            let attachments: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(StoredDm {
                username: row.get(0)?,
                content: row.get(1)?,
                attachments: serde_json::from_str(&attachments).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
                    })?,
            })
        })?;
        rows.collect()
    }
}
