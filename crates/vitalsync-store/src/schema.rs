//! Database schema and migrations.
//!
//! | Version | Change |
//! |---------|--------|
//! | 1 | `records` table (no delivery tracking) |
//! | 2 | nullable `sync_state` column; `NULL` rows predate tracking and read as synced |

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database, or a pre-versioning file with only the records table
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate(conn, 1)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
pub(crate) fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
pub(crate) fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Accepted readings, one row per measurement
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vital_type TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            value REAL NOT NULL,
            unit TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_records_type_time
            ON records(vital_type, timestamp_ms);
        "#,
    )?;

    Ok(())
}

/// Add delivery tracking (version 2).
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE records ADD COLUMN sync_state TEXT;
        CREATE INDEX IF NOT EXISTS idx_records_state_time
            ON records(sync_state, timestamp_ms);
        "#,
    )?;
    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    if old_version < 2 {
        info!("Migrating record store schema to version 2");
        migrate_to_v2(&tx)?;
    }

    set_schema_version(&tx, SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}
