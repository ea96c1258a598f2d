//! Main store implementation.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use vitalsync_types::{Reading, SyncState};

use crate::error::{Error, Result};
use crate::models::{ImportResult, StateCounts, StoredReading};
use crate::queries::RecordQuery;
use crate::schema;

/// Default number of records kept per vital type.
pub const DEFAULT_RETENTION: usize = 1000;

pub(crate) const RECORD_COLUMNS: &str = "id, vital_type, timestamp_ms, value, unit, sync_state";

/// SQLite-based durable record queue.
///
/// Every public method is atomic on its own. Appends enforce the per-type
/// retention cap in the same transaction as the insert.
pub struct Store {
    conn: Connection,
    retention: usize,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> std::result::Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    let ms: i64 = row.get(2)?;
    let timestamp = from_millis(ms)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, Box::new(e)))?;

    let sync_state = match row.get::<_, Option<String>>(5)? {
        None => SyncState::LEGACY,
        Some(s) => s
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
    };

    Ok(StoredReading {
        id: row.get(0)?,
        vital_type: row.get(1)?,
        timestamp,
        value: row.get(3)?,
        unit: row.get(4)?,
        sync_state,
    })
}

/// Delete the oldest records of `vital_type` beyond `cap`.
fn trim(conn: &Connection, vital_type: &str, cap: usize) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM records WHERE id IN (
             SELECT id FROM records WHERE vital_type = ?1
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT -1 OFFSET ?2
         )",
        rusqlite::params![vital_type, cap as i64],
    )?;
    Ok(deleted)
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening record store at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn,
            retention: DEFAULT_RETENTION,
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            retention: DEFAULT_RETENTION,
        })
    }

    /// Set the per-type retention cap. A cap below 1 is raised to 1.
    pub fn with_retention(mut self, cap: usize) -> Self {
        self.retention = cap.max(1);
        self
    }

    /// The per-type retention cap.
    pub fn retention(&self) -> usize {
        self.retention
    }
}

// Write operations
impl Store {
    /// Persist an accepted reading as `dirty`, then enforce the retention cap.
    pub fn append(&self, reading: &Reading) -> Result<StoredReading> {
        self.append_with_state(reading, SyncState::Dirty)
    }

    /// Persist a reading with an explicit initial state.
    ///
    /// The returned snapshot describes the inserted row even if the cap
    /// evicted it immediately (a reading older than every retained record).
    pub fn append_with_state(&self, reading: &Reading, state: SyncState) -> Result<StoredReading> {
        let timestamp_ms = to_millis(reading.timestamp);
        let timestamp = from_millis(timestamp_ms)
            .map_err(|e| Error::InvalidTimestamp(format!("{}: {}", reading.timestamp, e)))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO records (vital_type, timestamp_ms, value, unit, sync_state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                reading.vital_type,
                timestamp_ms,
                reading.value,
                reading.unit,
                state.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let evicted = trim(&tx, &reading.vital_type, self.retention)?;
        tx.commit()?;

        if evicted > 0 {
            debug!(
                "Evicted {} oldest {} record(s) over cap {}",
                evicted, reading.vital_type, self.retention
            );
        }

        Ok(StoredReading {
            id,
            vital_type: reading.vital_type.clone(),
            timestamp,
            value: reading.value,
            unit: reading.unit.clone(),
            sync_state: state,
        })
    }

    /// Transition a record in place and return the new snapshot.
    ///
    /// Only the state changes; timestamp, value and vital type are untouched.
    pub fn update_state(&self, id: i64, state: SyncState) -> Result<StoredReading> {
        let changed = self.conn.execute(
            "UPDATE records SET sync_state = ?2 WHERE id = ?1",
            rusqlite::params![id, state.as_str()],
        )?;
        if changed == 0 {
            return Err(Error::RecordNotFound(id));
        }
        self.get(id)?.ok_or(Error::RecordNotFound(id))
    }

    /// Move a record from `from` to `next` only if it is still in `from`.
    ///
    /// Returns `Ok(None)` when the record exists but is in another state,
    /// which means another cycle (possibly in another process) holds or
    /// released the claim. Illegal edges are rejected without touching the row.
    pub fn transition_state(
        &self,
        id: i64,
        from: SyncState,
        next: SyncState,
    ) -> Result<Option<StoredReading>> {
        if !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { id, from, to: next });
        }

        let changed = self.conn.execute(
            "UPDATE records SET sync_state = ?3 WHERE id = ?1 AND sync_state = ?2",
            rusqlite::params![id, from.as_str(), next.as_str()],
        )?;
        match self.get(id)? {
            Some(record) if changed > 0 => Ok(Some(record)),
            Some(record) => {
                debug!(
                    "Record {} is {}, not {}; leaving it alone",
                    id, record.sync_state, from
                );
                Ok(None)
            }
            None => Err(Error::RecordNotFound(id)),
        }
    }

    /// Delete records of one vital type, or all records. Returns the number deleted.
    pub fn clear(&self, vital_type: Option<&str>) -> Result<usize> {
        let deleted = match vital_type {
            Some(vital_type) => self
                .conn
                .execute("DELETE FROM records WHERE vital_type = ?", [vital_type])?,
            None => self.conn.execute("DELETE FROM records", [])?,
        };
        info!("Cleared {} record(s)", deleted);
        Ok(deleted)
    }

    /// Return records stranded in `syncing` (by a crash mid-cycle) to `dirty`.
    pub fn recover_in_flight(&self) -> Result<usize> {
        let recovered = self.conn.execute(
            "UPDATE records SET sync_state = ?1 WHERE sync_state = ?2",
            rusqlite::params![SyncState::Dirty.as_str(), SyncState::Syncing.as_str()],
        )?;
        if recovered > 0 {
            info!("Recovered {} in-flight record(s) to dirty", recovered);
        }
        Ok(recovered)
    }
}

// Read operations
impl Store {
    /// Records of one vital type, ascending by timestamp.
    pub fn query(&self, vital_type: &str, since: Option<OffsetDateTime>) -> Result<Vec<StoredReading>> {
        let mut query = RecordQuery::new().vital_type(vital_type);
        if let Some(since) = since {
            query = query.since(since);
        }
        self.query_records(&query)
    }

    /// All dirty records across types, oldest first.
    pub fn query_dirty(&self) -> Result<Vec<StoredReading>> {
        self.query_records(&RecordQuery::new().state(SyncState::Dirty))
    }

    /// Query records with filters.
    pub fn query_records(&self, query: &RecordQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get one record by id.
    pub fn get(&self, id: i64) -> Result<Option<StoredReading>> {
        let sql = format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, [id], map_record)
            .optional()?;
        Ok(record)
    }

    /// Count records of one vital type, or all records.
    pub fn count(&self, vital_type: Option<&str>) -> Result<u64> {
        let count: i64 = match vital_type {
            Some(vital_type) => self.conn.query_row(
                "SELECT COUNT(*) FROM records WHERE vital_type = ?",
                [vital_type],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Record counts per delivery state. Legacy rows count as synced.
    pub fn state_counts(&self) -> Result<StateCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(sync_state, 'synced'), COUNT(*) FROM records GROUP BY 1",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = StateCounts::default();
        for (state, count) in rows {
            match state.parse::<SyncState>() {
                Ok(SyncState::Dirty) => counts.dirty += count as u64,
                Ok(SyncState::Syncing) => counts.syncing += count as u64,
                Ok(SyncState::Synced) => counts.synced += count as u64,
                Err(e) => debug!("Ignoring rows with {}", e),
            }
        }
        Ok(counts)
    }

    /// Distinct vital types present in the store.
    pub fn vital_types(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT vital_type FROM records ORDER BY vital_type")?;
        let types = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(types)
    }
}

/// Row accepted by [`Store::import_json`]. Ids in the input are ignored.
#[derive(Debug, Deserialize)]
struct ImportRow {
    vital_type: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    value: f64,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default = "SyncState::legacy")]
    sync_state: SyncState,
}

// Import/export operations
impl Store {
    fn export_records(&self, vital_type: Option<&str>) -> Result<Vec<StoredReading>> {
        let mut query = RecordQuery::new();
        if let Some(vital_type) = vital_type {
            query = query.vital_type(vital_type);
        }
        self.query_records(&query)
    }

    /// Export records as CSV with a header row.
    pub fn export_csv(&self, vital_type: Option<&str>) -> Result<String> {
        let records = self.export_records(vital_type)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["id", "vital_type", "timestamp", "value", "unit", "sync_state"])?;
        for record in &records {
            let timestamp = record
                .timestamp
                .format(&Rfc3339)
                .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
            writer.write_record([
                record.id.to_string(),
                record.vital_type.clone(),
                timestamp,
                record.value.to_string(),
                record.unit.clone().unwrap_or_default(),
                record.sync_state.to_string(),
            ])?;
        }

        let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Export records as a JSON array.
    pub fn export_json(&self, vital_type: Option<&str>) -> Result<String> {
        let records = self.export_records(vital_type)?;
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Import records from a JSON array.
    ///
    /// Rows without a `sync_state` are imported as synced. The retention cap
    /// is applied once per affected vital type after all rows are inserted.
    pub fn import_json(&self, json: &str) -> Result<ImportResult> {
        let rows: Vec<ImportRow> = serde_json::from_str(json)?;
        let mut result = ImportResult {
            total: rows.len(),
            ..ImportResult::default()
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut affected = BTreeSet::new();
        for row in &rows {
            tx.execute(
                "INSERT INTO records (vital_type, timestamp_ms, value, unit, sync_state)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.vital_type,
                    to_millis(row.timestamp),
                    row.value,
                    row.unit,
                    row.sync_state.as_str(),
                ],
            )?;
            result.imported += 1;
            affected.insert(row.vital_type.as_str());
        }
        for vital_type in affected {
            result.evicted += trim(&tx, vital_type, self.retention)?;
        }
        tx.commit()?;

        info!(
            "Imported {} record(s), {} evicted by retention",
            result.imported, result.evicted
        );
        Ok(result)
    }
}
