//! SQLite database handle.
//!
//! A single connection guarded by a mutex serialises every mutating
//! operation; each engine operation then runs one SQLite transaction on the
//! guarded connection. Holding the guard across the transaction is what
//! gives claim rows their exclusive-lock semantics: two concurrent
//! validations of the same code are strictly ordered, and the loser reads
//! the committed post-transition state. WAL mode keeps readers unblocked
//! while a writer holds the connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};

use crate::error::EngineError;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Shared handle to the claim database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates a database at the given path and applies the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema fails
    /// to apply.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema fails to apply.
    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquires the connection, honouring an optional caller deadline.
    /// Import and reporting paths outside the engine go through here too.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Timeout`] when the deadline elapses while
    /// another operation holds the connection.
    pub fn acquire(
        &self,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'_, Connection>, EngineError> {
        match deadline {
            Some(deadline) => self
                .conn
                .try_lock_until(deadline)
                .ok_or(EngineError::Timeout),
            None => Ok(self.conn.lock()),
        }
    }
}

/// Converts a stored millisecond timestamp back to a UTC instant.
pub(crate) fn datetime_from_ms(ms: i64) -> Result<DateTime<Utc>, EngineError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| EngineError::Internal(format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn open_creates_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open(dir.path().join("claims.db")).unwrap();
        let conn = db.acquire(None).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM claims", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn acquire_times_out_when_held() {
        let db = Database::in_memory().unwrap();
        let _held = db.acquire(None).unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = db.acquire(Some(deadline)).unwrap_err();
        assert!(matches!(err, EngineError::Timeout));
    }

    #[test]
    fn timestamp_round_trips_millis() {
        let now = Utc::now();
        let ms = now.timestamp_millis();
        assert_eq!(datetime_from_ms(ms).unwrap().timestamp_millis(), ms);
    }
}
