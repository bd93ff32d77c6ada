//! Durable Store
//!
//! SQLite-backed store with two TTL-bounded collections:
//! - `conversation_turns`: expire 7 days after insertion
//! - `reminders`: hard expiry 30 days after insertion, regardless of due time
//!
//! Every row carries `created_at` and `expires_at` in unix milliseconds.
//! Reads ignore expired rows, and a background TTL monitor deletes them, so a
//! row is gone from every caller's point of view the instant it expires.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock;
use crate::conversation::ConversationTurn;
use crate::reminders::{NewReminder, Reminder};
use crate::types::{ChannelId, GuildId, UserId};

/// Conversation turn TTL in seconds (7 days)
pub const TURN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Reminder hard expiry in seconds (30 days)
pub const REMINDER_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Error type for durable store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Conversation turn collection
pub trait TurnLog: Send + Sync {
    /// Insert a turn; its `created_at` starts the TTL clock
    fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), StorageError>;

    /// Most recent unexpired turns for a user, newest first
    fn recent_turns(
        &self,
        user_id: UserId,
        limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<ConversationTurn>, StorageError>;

    /// Delete every turn of a user
    fn delete_turns(&self, user_id: UserId) -> Result<usize, StorageError>;
}

/// Reminder collection
pub trait ReminderLog: Send + Sync {
    /// Insert a pending reminder
    fn insert_reminder(&self, reminder: &NewReminder) -> Result<Reminder, StorageError>;

    /// Unexpired reminders with `due_at <= now`, earliest first
    fn due_reminders(&self, now: DateTime<FixedOffset>) -> Result<Vec<Reminder>, StorageError>;

    /// Delete one reminder; false if it was already gone
    fn delete_reminder(&self, id: i64) -> Result<bool, StorageError>;
}

/// Rows removed by one TTL sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub turns: usize,
    pub reminders: usize,
}

/// SQLite database holding both collections
pub struct Database {
    conn: Mutex<Connection>,
    turn_ttl: ChronoDuration,
    reminder_ttl: ChronoDuration,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self::from_connection(conn)?;

        info!("Durable store opened: {}", path.display());
        Ok(db)
    }

    /// Private in-memory database (tests, throwaway runs)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Override the collection TTLs
    pub fn with_ttls(mut self, turn_ttl: ChronoDuration, reminder_ttl: ChronoDuration) -> Self {
        self.turn_ttl = turn_ttl;
        self.reminder_ttl = reminder_ttl;
        self
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let db = Self {
            conn: Mutex::new(conn),
            turn_ttl: ChronoDuration::seconds(TURN_TTL_SECONDS),
            reminder_ttl: ChronoDuration::seconds(REMINDER_TTL_SECONDS),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_user_created
                ON conversation_turns(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_turns_expires
                ON conversation_turns(expires_at);

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                note TEXT NOT NULL,
                due_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reminders_due
                ON reminders(due_at);
            CREATE INDEX IF NOT EXISTS idx_reminders_expires
                ON reminders(expires_at);
            "#,
        )?;

        Ok(())
    }

    /// Delete every expired row in both collections
    pub fn purge_expired(&self, now: DateTime<FixedOffset>) -> Result<PurgeStats, StorageError> {
        let now_ms = now.timestamp_millis();
        let conn = self.conn.lock();

        let turns = conn.execute(
            "DELETE FROM conversation_turns WHERE expires_at <= ?1",
            params![now_ms],
        )?;
        let reminders = conn.execute(
            "DELETE FROM reminders WHERE expires_at <= ?1",
            params![now_ms],
        )?;

        let stats = PurgeStats { turns, reminders };
        if turns > 0 || reminders > 0 {
            info!(
                "TTL purge removed {} conversation turns and {} reminders",
                turns, reminders
            );
        }
        Ok(stats)
    }

    /// Run `purge_expired` on a fixed interval until `shutdown` flips to true
    pub fn spawn_ttl_monitor(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            debug!("TTL monitor started ({}s interval)", interval.as_secs());
            loop {
                if let Err(e) = self.purge_expired(clock::now()) {
                    warn!("TTL purge failed: {}", e);
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            debug!("TTL monitor stopped");
        })
    }

    /// Row counts (including not-yet-purged expired rows)
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let conn = self.conn.lock();
        let turns: i64 =
            conn.query_row("SELECT COUNT(*) FROM conversation_turns", [], |row| row.get(0))?;
        let reminders: i64 =
            conn.query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))?;

        Ok(StoreStats {
            turns: turns as usize,
            reminders: reminders as usize,
        })
    }
}

impl TurnLog for Database {
    fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), StorageError> {
        let created_at = turn.created_at.timestamp_millis();
        let expires_at = (turn.created_at + self.turn_ttl).timestamp_millis();

        self.conn.lock().execute(
            "INSERT INTO conversation_turns (user_id, prompt, response, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![turn.user_id.as_db(), turn.prompt, turn.response, created_at, expires_at],
        )?;

        debug!("Persisted turn for user {}", turn.user_id);
        Ok(())
    }

    fn recent_turns(
        &self,
        user_id: UserId,
        limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT prompt, response, created_at FROM conversation_turns
             WHERE user_id = ?1 AND expires_at > ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;

        let turns = stmt
            .query_map(
                params![user_id.as_db(), now.timestamp_millis(), limit as i64],
                |row| {
                    Ok(ConversationTurn {
                        user_id,
                        prompt: row.get(0)?,
                        response: row.get(1)?,
                        created_at: clock::from_millis(row.get(2)?),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(turns)
    }

    fn delete_turns(&self, user_id: UserId) -> Result<usize, StorageError> {
        let rows = self.conn.lock().execute(
            "DELETE FROM conversation_turns WHERE user_id = ?1",
            params![user_id.as_db()],
        )?;
        info!("Deleted {} stored turns for user {}", rows, user_id);
        Ok(rows)
    }
}

impl ReminderLog for Database {
    fn insert_reminder(&self, reminder: &NewReminder) -> Result<Reminder, StorageError> {
        let created_at = clock::now();
        let expires_at = created_at + self.reminder_ttl;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reminders (user_id, guild_id, channel_id, note, due_at, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reminder.user_id.as_db(),
                reminder.guild_id.as_db(),
                reminder.channel_id.as_db(),
                reminder.note,
                reminder.due_at.timestamp_millis(),
                created_at.timestamp_millis(),
                expires_at.timestamp_millis(),
            ],
        )?;

        Ok(Reminder {
            id: conn.last_insert_rowid(),
            user_id: reminder.user_id,
            guild_id: reminder.guild_id,
            channel_id: reminder.channel_id,
            note: reminder.note.clone(),
            due_at: clock::normalize(reminder.due_at),
        })
    }

    fn due_reminders(&self, now: DateTime<FixedOffset>) -> Result<Vec<Reminder>, StorageError> {
        let now_ms = now.timestamp_millis();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, guild_id, channel_id, note, due_at FROM reminders
             WHERE due_at <= ?1 AND expires_at > ?1
             ORDER BY due_at ASC, id ASC",
        )?;

        let reminders = stmt
            .query_map(params![now_ms], |row| {
                Ok(Reminder {
                    id: row.get(0)?,
                    user_id: UserId::from_db(row.get(1)?),
                    guild_id: GuildId::from_db(row.get(2)?),
                    channel_id: ChannelId::from_db(row.get(3)?),
                    note: row.get(4)?,
                    due_at: clock::from_millis(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reminders)
    }

    fn delete_reminder(&self, id: i64) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

/// Durable row counts
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub turns: usize,
    pub reminders: usize,
}
