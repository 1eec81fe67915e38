// SQLite persistence for tickets, games, winners and history.

mod games;
mod lookups;
mod results;
pub mod schema;
mod tickets;

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tracing::{info, warn};

pub use schema::MigrationReport;

/// SQLite-backed store for every durable entity.
///
/// One connection behind a mutex. Callers never see SQL; every method takes
/// or returns domain types from [`crate::lottery`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path`, create missing tables and
    /// bring an older file up to the current schema. Pass `":memory:"` for an
    /// ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        let report = schema::initialize_schema(&conn)?;
        if report.failed.is_empty() {
            info!(
                "database ready at {path} (schema version {}, {} migration(s) applied)",
                report.version,
                report.applied.len()
            );
        } else {
            warn!(
                "database opened at {path} with failed migrations {:?} (schema version {})",
                report.failed, report.version
            );
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Highest migration version recorded in the file.
    pub fn schema_version(&self) -> Result<u32> {
        schema::current_version(&self.conn())
    }
}

// ---------------------------------------------------------------------------
// Column encoding helpers
// ---------------------------------------------------------------------------

/// Timestamps are stored as RFC 3339 text with millisecond precision.
pub(crate) fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a timestamp column by index.
pub(crate) fn time_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    decode_time(idx, &text)
}

pub(crate) fn opt_time_at(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| decode_time(idx, &t)).transpose()
}

/// Number lists are stored as a JSON array string (e.g. `[3,7,15]`).
pub(crate) fn encode_numbers(numbers: &[u8]) -> Result<String> {
    serde_json::to_string(numbers).context("failed to serialize number list")
}

/// Unreadable or missing lists come back empty.
pub(crate) fn decode_numbers(json: Option<String>) -> Vec<u8> {
    json.and_then(|s| serde_json::from_str::<Vec<u8>>(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn encode_ids(ids: &[String]) -> Result<String> {
    serde_json::to_string(ids).context("failed to serialize id list")
}

pub(crate) fn decode_ids(json: Option<String>) -> Vec<String> {
    json.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}
