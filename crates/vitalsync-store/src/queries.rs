//! Query builder for stored records.
//!
//! # Example
//!
//! ```
//! use vitalsync_store::{Store, RecordQuery};
//! use vitalsync_types::SyncState;
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! // Pending temperature records from the last day, oldest first
//! let query = RecordQuery::new()
//!     .vital_type("temperature")
//!     .since(yesterday)
//!     .state(SyncState::Dirty);
//!
//! let records = store.query_records(&query)?;
//! assert!(records.is_empty());
//! # Ok::<(), vitalsync_store::Error>(())
//! ```

use time::OffsetDateTime;

use vitalsync_types::SyncState;

/// Fluent query builder for records.
///
/// By default, results are ordered by timestamp ascending, ties broken by
/// insertion order.
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Filter by vital type.
    pub vital_type: Option<String>,
    /// Include only records at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only records at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Filter by delivery state.
    pub state: Option<SyncState>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by timestamp descending.
    pub newest_first: bool,
}

impl RecordQuery {
    /// Create a query matching every record, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by vital type.
    pub fn vital_type(mut self, vital_type: &str) -> Self {
        self.vital_type = Some(vital_type.to_string());
        self
    }

    /// Filter to records taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to records taken at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Filter by delivery state.
    ///
    /// Filtering on [`SyncState::Synced`] includes legacy rows without a state.
    pub fn state(mut self, state: SyncState) -> Self {
        self.state = Some(state);
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref vital_type) = self.vital_type {
            conditions.push("vital_type = ?");
            params.push(Box::new(vital_type.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp_ms >= ?");
            params.push(Box::new(crate::store::to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp_ms <= ?");
            params.push(Box::new(crate::store::to_millis(until)));
        }

        if let Some(state) = self.state {
            if state == SyncState::LEGACY {
                conditions.push("(sync_state = ? OR sync_state IS NULL)");
            } else {
                conditions.push("sync_state = ?");
            }
            params.push(Box::new(state.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {} FROM records {} ORDER BY timestamp_ms {order}, id {order}",
            crate::store::RECORD_COLUMNS,
            where_clause,
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_is_unfiltered_ascending() {
        let query = RecordQuery::new();
        let (where_clause, params) = query.build_where();
        assert!(where_clause.is_empty());
        assert!(params.is_empty());
        assert!(query.build_sql().contains("ORDER BY timestamp_ms ASC, id ASC"));
    }

    #[test]
    fn test_filters_build_conditions() {
        let query = RecordQuery::new()
            .vital_type("temperature")
            .since(OffsetDateTime::UNIX_EPOCH)
            .state(SyncState::Dirty)
            .limit(5)
            .newest_first();
        let (where_clause, params) = query.build_where();
        assert_eq!(params.len(), 3);
        assert!(where_clause.contains("vital_type = ?"));
        assert!(where_clause.contains("sync_state = ?"));

        let sql = query.build_sql();
        assert!(sql.contains("DESC"));
        assert!(sql.ends_with("LIMIT 5"));
    }

    #[test]
    fn test_synced_filter_includes_legacy_rows() {
        let (where_clause, _) = RecordQuery::new().state(SyncState::Synced).build_where();
        assert!(where_clause.contains("sync_state IS NULL"));
    }
}
