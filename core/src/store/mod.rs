//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engine code calls store methods — it never executes SQL directly.
//!
//! Every method takes the connection lock for its own duration only, so a
//! single call is consistent but a read followed by a write is not atomic.
//! Read-modify-write callers serialise per user through `KeyedLocks`.

use crate::error::{BotError, BotResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

mod channel;
mod event;
mod user;
mod withdrawal;

pub struct BotStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl BotStore {
    pub fn open(path: &str) -> BotResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> BotResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Open a second handle on the same database file.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> BotResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run on every start.
    pub fn migrate(&self) -> BotResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_users.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_channels.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_withdrawals.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/004_event_log.sql"))?;
        Ok(())
    }

    fn conn(&self) -> BotResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BotError::StorePoisoned)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}
