//! SQLite connection bootstrap and schema setup for parcel storage.
//!
//! # Responsibility
//! - Open and configure SQLite connections handed to the parcel store.
//! - Create the `parcel` table before any application reads or writes.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - A database written by a newer binary is refused, never downgraded.

use crate::config::MAX_BUSY_TIMEOUT_MS;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_config};

pub type DbResult<T> = Result<T, DbError>;

/// Storage engine failure.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    BusyTimeoutOutOfRange {
        requested_ms: u64,
        max_ms: u64,
    },
}

impl DbError {
    /// Returns whether the engine reported lock contention that may clear on retry.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "parcel database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::BusyTimeoutOutOfRange {
                requested_ms,
                max_ms,
            } => write!(
                f,
                "busy timeout {requested_ms}ms exceeds the SQLite maximum of {max_ms}ms"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::BusyTimeoutOutOfRange { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Sets the connection busy timeout, refusing values SQLite cannot hold.
pub(crate) fn apply_busy_timeout(conn: &Connection, timeout_ms: u64) -> DbResult<()> {
    if timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(DbError::BusyTimeoutOutOfRange {
            requested_ms: timeout_ms,
            max_ms: MAX_BUSY_TIMEOUT_MS,
        });
    }
    conn.busy_timeout(Duration::from_millis(timeout_ms))?;
    Ok(())
}
