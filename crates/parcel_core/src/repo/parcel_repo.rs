//! Parcel store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide single-statement CRUD access to the `parcel` table.
//! - Keep SQL details behind the [`ParcelStore`] capability.
//!
//! # Invariants
//! - Every operation performs exactly one statement round-trip per attempt.
//! - `set_status`, `set_address` and `delete` succeed when no row matches.
//! - `get` reports a missing row as [`RepoError::NotFound`], never as `Db`.
//! - The `*_if` variants apply only while the stored status still equals the
//!   expected one, in the same statement, and report whether a row changed.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::config::{RetryPolicy, StoreConfig};
use crate::db::migrations::latest_version;
use crate::db::{apply_busy_timeout, DbError};
use crate::model::parcel::{ClientId, Parcel, ParcelNumber, ParcelStatus};
use log::{debug, warn};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PARCEL_TABLE: &str = "parcel";
const PARCEL_COLUMNS: [&str; 5] = ["number", "client", "status", "address", "created_at"];

const PARCEL_SELECT_SQL: &str = "SELECT
    number,
    client,
    status,
    address,
    created_at
FROM parcel";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from parcel store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Storage engine failure, propagated as reported.
    Db(DbError),
    /// No parcel has the requested number.
    NotFound(ParcelNumber),
    /// Persisted row cannot be converted into a [`Parcel`].
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Whether the error means the requested parcel is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(number) => write!(f, "parcel not found: {number}"),
            Self::InvalidData(message) => write!(f, "invalid persisted parcel data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "parcel store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "parcel store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "parcel store requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable CRUD access to parcel records.
pub trait ParcelStore {
    /// Inserts a new parcel and returns its store-assigned number.
    ///
    /// `parcel.number` is ignored.
    fn add(&self, parcel: &Parcel) -> RepoResult<ParcelNumber>;
    /// Lists all parcels owned by `client`, oldest number first.
    fn get_by_client(&self, client: ClientId) -> RepoResult<Vec<Parcel>>;
    /// Loads one parcel by number.
    fn get(&self, number: ParcelNumber) -> RepoResult<Parcel>;
    /// Overwrites the status. Succeeds without effect when `number` is unknown.
    fn set_status(&self, number: ParcelNumber, status: ParcelStatus) -> RepoResult<()>;
    /// Overwrites the address. Succeeds without effect when `number` is unknown.
    fn set_address(&self, number: ParcelNumber, address: &str) -> RepoResult<()>;
    /// Physically removes the parcel. Succeeds without effect when `number` is unknown.
    fn delete(&self, number: ParcelNumber) -> RepoResult<()>;
    /// Sets `status` only if the parcel currently has status `expected`.
    ///
    /// Returns `false` when the parcel is missing or its status differs.
    fn set_status_if(
        &self,
        number: ParcelNumber,
        expected: ParcelStatus,
        status: ParcelStatus,
    ) -> RepoResult<bool>;
    /// Sets `address` only if the parcel currently has status `expected`.
    fn set_address_if(
        &self,
        number: ParcelNumber,
        expected: ParcelStatus,
        address: &str,
    ) -> RepoResult<bool>;
    /// Deletes the parcel only if it currently has status `expected`.
    fn delete_if(&self, number: ParcelNumber, expected: ParcelStatus) -> RepoResult<bool>;
}

/// SQLite-backed parcel store borrowing a caller-owned connection.
pub struct SqliteParcelStore<'conn> {
    conn: &'conn Connection,
    retry: RetryPolicy,
}

impl<'conn> SqliteParcelStore<'conn> {
    /// Creates a store from a migrated connection.
    ///
    /// Uses the default retry policy and leaves the connection busy timeout as is.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_parcel_connection_ready(conn)?;
        Ok(Self {
            conn,
            retry: RetryPolicy::default(),
        })
    }

    /// Creates a store from a migrated connection and applies `config`.
    ///
    /// Sets the connection busy timeout and uses the configured retry policy.
    pub fn with_config(conn: &'conn Connection, config: &StoreConfig) -> RepoResult<Self> {
        ensure_parcel_connection_ready(conn)?;
        apply_busy_timeout(conn, config.busy_timeout_ms)?;
        Ok(Self {
            conn,
            retry: config.retry,
        })
    }

    fn run<T>(&self, event: &str, mut op: impl FnMut() -> RepoResult<T>) -> RepoResult<T> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match op() {
                Err(RepoError::Db(err)) if err.is_busy() && attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "event={} module=repo status=retry attempt={} max_attempts={} delay_ms={} error={}",
                        event,
                        attempt,
                        attempts,
                        delay.as_millis(),
                        err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl ParcelStore for SqliteParcelStore<'_> {
    fn add(&self, parcel: &Parcel) -> RepoResult<ParcelNumber> {
        let number = self.run("parcel_add", || {
            self.conn.execute(
                "INSERT INTO parcel (client, status, address, created_at)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    parcel.client,
                    parcel.status.as_str(),
                    parcel.address.as_str(),
                    parcel.created_at.as_str(),
                ],
            )?;
            Ok(self.conn.last_insert_rowid())
        })?;

        debug!(
            "event=parcel_add module=repo status=ok number={} client={}",
            number, parcel.client
        );
        Ok(number)
    }

    fn get_by_client(&self, client: ClientId) -> RepoResult<Vec<Parcel>> {
        let parcels = self.run("parcel_get_by_client", || {
            let mut stmt = self.conn.prepare(&format!(
                "{PARCEL_SELECT_SQL}
                 WHERE client = ?1
                 ORDER BY number ASC;"
            ))?;
            let mut rows = stmt.query([client])?;
            let mut parcels = Vec::new();
            while let Some(row) = rows.next()? {
                parcels.push(parse_parcel_row(row)?);
            }
            Ok(parcels)
        })?;

        debug!(
            "event=parcel_get_by_client module=repo status=ok client={} count={}",
            client,
            parcels.len()
        );
        Ok(parcels)
    }

    fn get(&self, number: ParcelNumber) -> RepoResult<Parcel> {
        self.run("parcel_get", || {
            let mut stmt = self
                .conn
                .prepare(&format!("{PARCEL_SELECT_SQL} WHERE number = ?1;"))?;
            let mut rows = stmt.query([number])?;
            if let Some(row) = rows.next()? {
                return parse_parcel_row(row);
            }
            Err(RepoError::NotFound(number))
        })
    }

    fn set_status(&self, number: ParcelNumber, status: ParcelStatus) -> RepoResult<()> {
        let changed = self.run("parcel_set_status", || {
            Ok(self.conn.execute(
                "UPDATE parcel SET status = ?1 WHERE number = ?2;",
                params![status.as_str(), number],
            )?)
        })?;
        log_mutation("parcel_set_status", number, changed);
        Ok(())
    }

    fn set_address(&self, number: ParcelNumber, address: &str) -> RepoResult<()> {
        let changed = self.run("parcel_set_address", || {
            Ok(self.conn.execute(
                "UPDATE parcel SET address = ?1 WHERE number = ?2;",
                params![address, number],
            )?)
        })?;
        log_mutation("parcel_set_address", number, changed);
        Ok(())
    }

    fn delete(&self, number: ParcelNumber) -> RepoResult<()> {
        let changed = self.run("parcel_delete", || {
            Ok(self
                .conn
                .execute("DELETE FROM parcel WHERE number = ?1;", [number])?)
        })?;
        log_mutation("parcel_delete", number, changed);
        Ok(())
    }

    fn set_status_if(
        &self,
        number: ParcelNumber,
        expected: ParcelStatus,
        status: ParcelStatus,
    ) -> RepoResult<bool> {
        let changed = self.run("parcel_set_status_if", || {
            Ok(self.conn.execute(
                "UPDATE parcel SET status = ?1 WHERE number = ?2 AND status = ?3;",
                params![status.as_str(), number, expected.as_str()],
            )?)
        })?;
        log_mutation("parcel_set_status_if", number, changed);
        Ok(changed > 0)
    }

    fn set_address_if(
        &self,
        number: ParcelNumber,
        expected: ParcelStatus,
        address: &str,
    ) -> RepoResult<bool> {
        let changed = self.run("parcel_set_address_if", || {
            Ok(self.conn.execute(
                "UPDATE parcel SET address = ?1 WHERE number = ?2 AND status = ?3;",
                params![address, number, expected.as_str()],
            )?)
        })?;
        log_mutation("parcel_set_address_if", number, changed);
        Ok(changed > 0)
    }

    fn delete_if(&self, number: ParcelNumber, expected: ParcelStatus) -> RepoResult<bool> {
        let changed = self.run("parcel_delete_if", || {
            Ok(self.conn.execute(
                "DELETE FROM parcel WHERE number = ?1 AND status = ?2;",
                params![number, expected.as_str()],
            )?)
        })?;
        log_mutation("parcel_delete_if", number, changed);
        Ok(changed > 0)
    }
}

fn log_mutation(event: &str, number: ParcelNumber, changed: usize) {
    let status = if changed == 0 { "noop" } else { "ok" };
    debug!("event={event} module=repo status={status} number={number} rows={changed}");
}

fn parse_parcel_row(row: &Row<'_>) -> RepoResult<Parcel> {
    let number: ParcelNumber = row.get("number")?;

    let client = row
        .get::<_, Option<ClientId>>("client")?
        .ok_or_else(|| null_column(number, "client"))?;

    let status_text = row
        .get::<_, Option<String>>("status")?
        .ok_or_else(|| null_column(number, "status"))?;
    let status = status_text.parse::<ParcelStatus>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in parcel.status for number {number}"
        ))
    })?;

    let address = row
        .get::<_, Option<String>>("address")?
        .ok_or_else(|| null_column(number, "address"))?;
    let created_at = row
        .get::<_, Option<String>>("created_at")?
        .ok_or_else(|| null_column(number, "created_at"))?;

    Ok(Parcel {
        number,
        client,
        status,
        address,
        created_at,
    })
}

fn null_column(number: ParcelNumber, column: &str) -> RepoError {
    RepoError::InvalidData(format!("NULL parcel.{column} for number {number}"))
}

fn ensure_parcel_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, PARCEL_TABLE)? {
        return Err(RepoError::MissingRequiredTable(PARCEL_TABLE));
    }

    for column in PARCEL_COLUMNS {
        if !table_has_column(conn, PARCEL_TABLE, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: PARCEL_TABLE,
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
