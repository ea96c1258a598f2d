//! Durable record queue for the VitalSync telemetry engine.
//!
//! This crate provides SQLite-based storage for accepted readings and their
//! delivery state, so nothing is lost while the device is offline.
//!
//! # Features
//!
//! - Append readings as `dirty`, with a per-type retention cap enforced atomically
//! - Query by vital type, time range and delivery state
//! - In-place state transitions returning fresh snapshots
//! - Crash recovery of records stranded mid-delivery
//! - Schema migrations (rows from before delivery tracking read as `synced`)
//! - CSV and JSON export, JSON import
//!
//! # Example
//!
//! ```
//! use time::OffsetDateTime;
//! use vitalsync_store::Store;
//! use vitalsync_types::{Reading, SyncState};
//!
//! let store = Store::open_in_memory()?;
//! let record = store.append(&Reading::new("temperature", 36.6, OffsetDateTime::now_utc()))?;
//! assert_eq!(record.sync_state, SyncState::Dirty);
//!
//! let pending = store.query_dirty()?;
//! assert_eq!(pending.len(), 1);
//! # Ok::<(), vitalsync_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{ImportResult, StateCounts, StoredReading};
pub use queries::RecordQuery;
pub use store::{DEFAULT_RETENTION, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/vitalsync/records.db`
/// - macOS: `~/Library/Application Support/vitalsync/records.db`
/// - Windows: `C:\Users\<user>\AppData\Local\vitalsync\records.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("vitalsync")
        .join("records.db")
}
