//! Reading Store - SQLite-backed append-only reading storage
//!
//! One row per reading keyed by the source-assigned id. Inserts are
//! idempotent (`INSERT OR IGNORE`), rows are never updated or deleted.
//! Range queries use the `date_ms` B-tree index and exclude sensor error
//! markers (`sgv <= 0`).
//!
//! The store is opened and dropped per logical operation; there is no
//! long-lived lock beyond SQLite's own transaction atomicity.

use super::error::{StorageError, StorageResult};
use super::types::{Reading, TimeRange};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS readings (
        id TEXT PRIMARY KEY,
        sgv INTEGER,
        date_ms INTEGER,
        date_string TEXT,
        trend INTEGER,
        direction TEXT,
        device TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_readings_date ON readings(date_ms);
";

const INSERT_READING: &str = "INSERT OR IGNORE INTO readings
    (id, sgv, date_ms, date_string, trend, direction, device)
    VALUES (?, ?, ?, ?, ?, ?, ?)";

const SELECT_COLUMNS: &str = "SELECT id, sgv, date_ms, date_string, trend, direction, device
    FROM readings";

/// Durable keyed storage for CGM readings
pub struct ReadingStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ReadingStore {
    /// Create or open a store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Open {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?path, "Reading store opened");
        Ok(Self { conn, path })
    }

    /// Path of the backing file (None for in-memory stores)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total number of stored rows, including sensor error markers
    pub fn total_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Whether a reading with this id is already stored
    pub fn contains(&self, external_id: &str) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM readings WHERE id = ?",
                params![external_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a reading unless its id already exists
    ///
    /// Returns true when a new row was written.
    pub fn insert_if_absent(&self, reading: &Reading) -> StorageResult<bool> {
        let mut stmt = self.conn.prepare_cached(INSERT_READING)?;
        Ok(insert_with(&mut stmt, reading)? > 0)
    }

    /// Insert a batch in a single transaction
    ///
    /// The batch is committed as a whole; returns the number of new rows.
    pub fn insert_page(&mut self, readings: &[Reading]) -> StorageResult<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_READING)?;
            for reading in readings {
                inserted += insert_with(&mut stmt, reading)?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    /// Readings in `range`, ascending by time, excluding non-positive values
    pub fn query(&self, range: TimeRange) -> StorageResult<Vec<Reading>> {
        let sql = format!(
            "{} WHERE date_ms >= ? AND date_ms < ? AND sgv > 0 ORDER BY date_ms",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![range.start, range.end], row_to_reading)?;
        let readings = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// Readings at or after `start_ms`
    pub fn since(&self, start_ms: i64) -> StorageResult<Vec<Reading>> {
        self.query(TimeRange::since(start_ms))
    }

    /// Most recent valid reading, if any
    pub fn latest(&self) -> StorageResult<Option<Reading>> {
        let sql = format!(
            "{} WHERE sgv > 0 ORDER BY date_ms DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let reading = self
            .conn
            .query_row(&sql, [], row_to_reading)
            .optional()?;
        Ok(reading)
    }
}

fn insert_with(stmt: &mut rusqlite::CachedStatement<'_>, reading: &Reading) -> rusqlite::Result<usize> {
    stmt.execute(params![
        reading.external_id,
        reading.glucose_value,
        reading.timestamp_ms,
        reading.display_timestamp,
        reading.trend_code,
        reading.trend_direction,
        reading.device_label,
    ])
}

fn row_to_reading(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        external_id: row.get(0)?,
        glucose_value: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        timestamp_ms: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        display_timestamp: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        trend_code: row.get(4)?,
        trend_direction: row.get(5)?,
        device_label: row.get(6)?,
    })
}
