use crate::auth::Actor;
use crate::error::HistoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS report_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    filename TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS admin_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    action TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_report_history_username ON report_history (username);
CREATE INDEX IF NOT EXISTS idx_admin_logs_username ON admin_logs (username);
";

// Concurrent sessions append to the same file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One artifact-producing action: who made what, and when
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub actor: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of the admin activity log
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub actor: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only SQLite store of report history and activity
///
/// The store only remembers where the database lives. Every call opens its
/// own connection and closes it before returning, so no handle is shared
/// between sessions. Each append is a single INSERT and therefore atomic.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Open (creating if needed) the database at `path`
    ///
    /// # Errors
    /// * `HistoryError::Io` if the parent directory cannot be created
    /// * `HistoryError::Database` if the schema cannot be applied
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { path };
        store.connect()?.execute_batch(SCHEMA_SQL)?;
        debug!("History store ready at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, HistoryError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Record that `actor` produced the artifact `label` at `timestamp`
    pub fn append(
        &self,
        actor: &str,
        label: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        self.connect()?.execute(
            "INSERT INTO report_history (username, filename, timestamp) VALUES (?1, ?2, ?3)",
            params![actor, label, encode_timestamp(timestamp)],
        )?;
        Ok(())
    }

    /// Record an artifact and its activity-log entry together
    ///
    /// Both rows go in one transaction: either the history record and the
    /// action are stored, or neither is.
    pub fn append_with_action(
        &self,
        actor: &str,
        label: &str,
        action: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let at = encode_timestamp(timestamp);
        tx.execute(
            "INSERT INTO report_history (username, filename, timestamp) VALUES (?1, ?2, ?3)",
            params![actor, label, at],
        )?;
        tx.execute(
            "INSERT INTO admin_logs (username, action, timestamp) VALUES (?1, ?2, ?3)",
            params![actor, action, at],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// History of one actor, oldest first
    pub fn query_by_actor(&self, actor: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT username, filename, timestamp FROM report_history
             WHERE username = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![actor], raw_row)?;
        collect(rows)
    }

    /// Every actor's history, oldest first
    ///
    /// # Errors
    /// * `HistoryError::NotAdmin` unless `requester` is an admin
    pub fn query_all(&self, requester: &Actor) -> Result<Vec<HistoryRecord>, HistoryError> {
        require_admin(requester)?;

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT username, filename, timestamp FROM report_history
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map([], raw_row)?;
        collect(rows)
    }

    /// Add an entry to the admin activity log
    pub fn log_action(
        &self,
        actor: &str,
        action: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistoryError> {
        self.connect()?.execute(
            "INSERT INTO admin_logs (username, action, timestamp) VALUES (?1, ?2, ?3)",
            params![actor, action, encode_timestamp(timestamp)],
        )?;
        Ok(())
    }

    pub fn actions_by_actor(&self, actor: &str) -> Result<Vec<ActionRecord>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT username, action, timestamp FROM admin_logs
             WHERE username = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![actor], raw_row)?;
        collect(rows)
    }

    /// The whole activity log, oldest first; admin only
    pub fn actions(&self, requester: &Actor) -> Result<Vec<ActionRecord>, HistoryError> {
        require_admin(requester)?;

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT username, action, timestamp FROM admin_logs
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map([], raw_row)?;
        collect(rows)
    }
}

fn require_admin(requester: &Actor) -> Result<(), HistoryError> {
    if requester.is_admin() {
        Ok(())
    } else {
        Err(HistoryError::NotAdmin(requester.id.clone()))
    }
}

// Fixed-width UTC text, so lexical order in SQL is chronological order
fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(text: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| HistoryError::Timestamp(text.to_string()))
}

// Rows are read raw and converted afterwards so a bad timestamp surfaces as
// HistoryError::Timestamp rather than a generic SQLite conversion error.
type RawRow = (String, String, String);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

trait FromRaw: Sized {
    fn from_raw(raw: RawRow) -> Result<Self, HistoryError>;
}

impl FromRaw for HistoryRecord {
    fn from_raw((actor, label, timestamp): RawRow) -> Result<Self, HistoryError> {
        Ok(Self {
            actor,
            label,
            created_at: decode_timestamp(&timestamp)?,
        })
    }
}

impl FromRaw for ActionRecord {
    fn from_raw((actor, action, timestamp): RawRow) -> Result<Self, HistoryError> {
        Ok(Self {
            actor,
            action,
            created_at: decode_timestamp(&timestamp)?,
        })
    }
}

fn collect<T: FromRaw>(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<T>, HistoryError> {
    rows.map(|raw| T::from_raw(raw?)).collect()
}
