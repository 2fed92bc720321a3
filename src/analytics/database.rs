// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite database wrapper for the analytics store.
//!
//! Handles schema creation, idempotent batch upserts, aggregate queries, and
//! the materialized per-component summary table.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::error::AnalyticsError;
use crate::record::ExecutionRecord;

use super::types::{
    percentile, AggregateFilter, AggregateRow, ComponentSummary, GroupBy, GroupKey, LayerSummary,
};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL predicate matching failed executions.
const FAILURE_PREDICATE: &str = "status IN ('error', 'timeout')";

/// Aggregate columns shared by the summary view and ad-hoc queries.
const SUMMARY_COLUMNS: &str = "COUNT(*), AVG(duration_ms), MIN(duration_ms), MAX(duration_ms), \
     SUM(duration_ms), AVG(memory_mb), MAX(memory_mb), AVG(cpu_percent), \
     SUM(CASE WHEN status IN ('error', 'timeout') THEN 1 ELSE 0 END), \
     SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), \
     MAX(timestamp_us)";

/// Column-oriented query tier holding a relational copy of every synced record.
///
/// This store is a projection: it can always be rebuilt by replaying the
/// record store, and is never the authority on whether a write happened.
pub struct AnalyticsStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl AnalyticsStore {
    /// Open or create an analytics database at a specific path.
    pub fn open(db_path: &Path) -> Result<Self, AnalyticsError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // WAL keeps report queries from blocking the synchronizer.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;

        let store = Self {
            conn: Mutex::new(Some(conn)),
            path: Some(db_path.to_path_buf()),
        };
        store.init_schema()?;

        info!(path = %db_path.display(), "Opened analytics store");
        Ok(store)
    }

    /// Open a transient in-memory analytics database.
    pub fn open_in_memory() -> Result<Self, AnalyticsError> {
        let store = Self {
            conn: Mutex::new(Some(Connection::open_in_memory()?)),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the database file path (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, AnalyticsError>,
    ) -> Result<T, AnalyticsError> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(AnalyticsError::Closed),
        }
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), AnalyticsError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                timestamp_us INTEGER NOT NULL,
                context_type TEXT NOT NULL,
                context_id TEXT NOT NULL,
                context_name TEXT NOT NULL,
                parent_context TEXT,
                request_data TEXT NOT NULL,
                response_data TEXT NOT NULL,
                metadata TEXT NOT NULL,
                duration_ms REAL NOT NULL,
                memory_mb REAL NOT NULL,
                cpu_percent REAL NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                code_snapshot TEXT,
                code_hash TEXT,
                variant_id TEXT,
                synced_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS execution_summary (
                context_type TEXT NOT NULL,
                context_name TEXT NOT NULL,
                execution_count INTEGER NOT NULL,
                avg_duration_ms REAL NOT NULL,
                min_duration_ms REAL NOT NULL,
                max_duration_ms REAL NOT NULL,
                total_duration_ms REAL NOT NULL,
                avg_memory_mb REAL NOT NULL,
                max_memory_mb REAL NOT NULL,
                avg_cpu_percent REAL NOT NULL,
                error_count INTEGER NOT NULL,
                success_count INTEGER NOT NULL,
                last_execution_us INTEGER,
                PRIMARY KEY (context_type, context_name)
            );

            CREATE INDEX IF NOT EXISTS idx_executions_component ON executions(context_type, context_name);
            CREATE INDEX IF NOT EXISTS idx_executions_context_id ON executions(context_type, context_id);
            CREATE INDEX IF NOT EXISTS idx_executions_timestamp ON executions(timestamp_us);
            CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);
            "#,
            )?;

            let current_version: Option<u32> = conn
                .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;

            if current_version.is_none() {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Ok(())
        })
    }

    /// Insert a batch of records and refresh the summary rows they touch.
    ///
    /// Keyed by record id: replaying a batch inserts nothing new. Returns the
    /// number of newly inserted rows. The whole batch commits or none of it.
    #[instrument(level = "debug", skip_all, fields(batch_size = records.len()))]
    pub fn upsert_batch(&self, records: &[ExecutionRecord]) -> Result<usize, AnalyticsError> {
        if records.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();

        let inserted = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            let mut touched: HashSet<(&str, &str)> = HashSet::new();
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO executions (
                        id, timestamp, timestamp_us, context_type, context_id, context_name,
                        parent_context, request_data, response_data, metadata,
                        duration_ms, memory_mb, cpu_percent, status, error,
                        code_snapshot, code_hash, variant_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                    ON CONFLICT(id) DO NOTHING",
                )?;

                for record in records {
                    inserted += stmt.execute(params![
                        record.id,
                        record.timestamp.to_rfc3339(),
                        record.timestamp.timestamp_micros(),
                        record.context_type,
                        record.context_id,
                        record.context_name,
                        record.parent_context,
                        serde_json::to_string(&record.request_data)?,
                        serde_json::to_string(&record.response_data)?,
                        serde_json::to_string(&record.metadata)?,
                        record.duration_ms,
                        record.memory_mb,
                        record.cpu_percent,
                        record.status.as_str(),
                        record.error,
                        record.code_snapshot,
                        record.code_hash,
                        record.variant_id,
                    ])?;
                    touched.insert((record.context_type.as_str(), record.context_name.as_str()));
                }
            }

            {
                let mut refresh = tx.prepare_cached(&format!(
                    "INSERT OR REPLACE INTO execution_summary (
                        context_type, context_name, execution_count, avg_duration_ms,
                        min_duration_ms, max_duration_ms, total_duration_ms, avg_memory_mb,
                        max_memory_mb, avg_cpu_percent, error_count, success_count, last_execution_us
                    )
                    SELECT context_type, context_name, {}
                    FROM executions WHERE context_type = ?1 AND context_name = ?2
                    GROUP BY context_type, context_name",
                    SUMMARY_COLUMNS
                ))?;
                for (layer, name) in &touched {
                    refresh.execute(params![layer, name])?;
                }
            }

            tx.commit()?;
            Ok(inserted)
        })?;

        debug!(
            inserted,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upserted analytics batch"
        );
        Ok(inserted)
    }

    /// Re-derive the entire summary view from the executions table.
    pub fn rebuild_summary(&self) -> Result<usize, AnalyticsError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM execution_summary", [])?;
            let rows = tx.execute(
                &format!(
                    "INSERT INTO execution_summary (
                        context_type, context_name, execution_count, avg_duration_ms,
                        min_duration_ms, max_duration_ms, total_duration_ms, avg_memory_mb,
                        max_memory_mb, avg_cpu_percent, error_count, success_count, last_execution_us
                    )
                    SELECT context_type, context_name, {}
                    FROM executions GROUP BY context_type, context_name",
                    SUMMARY_COLUMNS
                ),
                [],
            )?;
            tx.commit()?;
            Ok(rows)
        })
    }

    /// Aggregate figures over filtered records, grouped as requested.
    ///
    /// Percentiles use nearest-rank over the sorted durations of each group.
    /// Groups with no records are omitted, so an empty result means no data.
    pub fn aggregate(
        &self,
        filter: &AggregateFilter,
        group_by: GroupBy,
    ) -> Result<Vec<AggregateRow>, AnalyticsError> {
        let (where_sql, values) = filter_clause(filter);
        let columns = group_by.columns();
        let key_sql = if columns.is_empty() {
            String::new()
        } else {
            format!("{}, ", columns.join(", "))
        };
        let (group_sql, order_sql) = if columns.is_empty() {
            (String::new(), String::new())
        } else {
            let joined = columns.join(", ");
            (format!(" GROUP BY {}", joined), format!(" ORDER BY {}", joined))
        };
        let key_count = columns.len();

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {keys}COUNT(*),
                    COALESCE(SUM(duration_ms), 0), COALESCE(AVG(duration_ms), 0),
                    COALESCE(MIN(duration_ms), 0), COALESCE(MAX(duration_ms), 0),
                    COALESCE(AVG(memory_mb), 0), COALESCE(MAX(memory_mb), 0),
                    COALESCE(AVG(cpu_percent), 0), COALESCE(MAX(cpu_percent), 0),
                    COALESCE(SUM(CASE WHEN {failure} THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0)
                 FROM executions{filter}{group}{order}",
                keys = key_sql,
                failure = FAILURE_PREDICATE,
                filter = where_sql,
                group = group_sql,
                order = order_sql,
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                let mut key_values = Vec::with_capacity(key_count);
                for i in 0..key_count {
                    key_values.push(row.get::<_, String>(i)?);
                }
                let n = key_count;
                Ok((
                    key_values,
                    AggregateRow {
                        key: GroupKey::default(),
                        count: row.get::<_, i64>(n)?.max(0) as u64,
                        total_duration_ms: row.get(n + 1)?,
                        avg_duration_ms: row.get(n + 2)?,
                        min_duration_ms: row.get(n + 3)?,
                        max_duration_ms: row.get(n + 4)?,
                        avg_memory_mb: row.get(n + 5)?,
                        max_memory_mb: row.get(n + 6)?,
                        avg_cpu_percent: row.get(n + 7)?,
                        max_cpu_percent: row.get(n + 8)?,
                        error_count: row.get::<_, i64>(n + 9)?.max(0) as u64,
                        success_count: row.get::<_, i64>(n + 10)?.max(0) as u64,
                        ..Default::default()
                    },
                ))
            })?;

            let mut grouped = Vec::new();
            for row in rows {
                let (key_values, aggregate) = row?;
                if aggregate.count > 0 {
                    grouped.push((key_values, aggregate));
                }
            }

            // Second pass: sorted durations per group for percentiles.
            let mut durations: HashMap<Vec<String>, Vec<f64>> = HashMap::new();
            let duration_sql = format!(
                "SELECT {keys}duration_ms FROM executions{filter} ORDER BY duration_ms",
                keys = key_sql,
                filter = where_sql,
            );
            let mut stmt = conn.prepare(&duration_sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                let mut key_values = Vec::with_capacity(key_count);
                for i in 0..key_count {
                    key_values.push(row.get::<_, String>(i)?);
                }
                Ok((key_values, row.get::<_, f64>(key_count)?))
            })?;
            for row in rows {
                let (key_values, duration) = row?;
                durations.entry(key_values).or_default().push(duration);
            }

            Ok(grouped
                .into_iter()
                .map(|(key_values, mut aggregate)| {
                    if let Some(sorted) = durations.get(&key_values) {
                        aggregate.p50_duration_ms = percentile(sorted, 50.0);
                        aggregate.p95_duration_ms = percentile(sorted, 95.0);
                        aggregate.p99_duration_ms = percentile(sorted, 99.0);
                    }
                    aggregate.key = GroupKey::from_values(group_by, key_values);
                    aggregate
                })
                .collect())
        })
    }

    /// Read the summary view, keeping components with at least `min_executions` runs.
    ///
    /// Ordered by total time spent, highest first.
    pub fn component_summaries(
        &self,
        min_executions: u64,
    ) -> Result<Vec<ComponentSummary>, AnalyticsError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT context_type, context_name, execution_count, avg_duration_ms,
                        min_duration_ms, max_duration_ms, total_duration_ms, avg_memory_mb,
                        max_memory_mb, avg_cpu_percent, error_count, success_count, last_execution_us
                 FROM execution_summary
                 WHERE execution_count >= ?1
                 ORDER BY total_duration_ms DESC, context_type, context_name",
            )?;
            let min = i64::try_from(min_executions).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![min], summary_from_row)?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        })
    }

    /// Read one component's summary row.
    pub fn component_summary(
        &self,
        layer: &str,
        name: &str,
    ) -> Result<Option<ComponentSummary>, AnalyticsError> {
        self.with_conn(|conn| {
            let summary = conn
                .query_row(
                    "SELECT context_type, context_name, execution_count, avg_duration_ms,
                            min_duration_ms, max_duration_ms, total_duration_ms, avg_memory_mb,
                            max_memory_mb, avg_cpu_percent, error_count, success_count, last_execution_us
                     FROM execution_summary WHERE context_type = ?1 AND context_name = ?2",
                    params![layer, name],
                    summary_from_row,
                )
                .optional()?;
            Ok(summary)
        })
    }

    /// Per-layer totals from the summary view.
    pub fn layer_summaries(&self) -> Result<Vec<LayerSummary>, AnalyticsError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT context_type, COUNT(*), SUM(execution_count), SUM(total_duration_ms), SUM(error_count)
                 FROM execution_summary GROUP BY context_type ORDER BY context_type",
            )?;
            let rows = stmt.query_map([], |row| {
                let execution_count = row.get::<_, i64>(2)?.max(0) as u64;
                let total_duration_ms: f64 = row.get(3)?;
                Ok(LayerSummary {
                    layer: row.get(0)?,
                    component_count: row.get::<_, i64>(1)?.max(0) as u64,
                    execution_count,
                    avg_duration_ms: if execution_count == 0 {
                        0.0
                    } else {
                        total_duration_ms / execution_count as f64
                    },
                    total_duration_ms,
                    error_count: row.get::<_, i64>(4)?.max(0) as u64,
                })
            })?;
            let mut layers = Vec::new();
            for row in rows {
                layers.push(row?);
            }
            Ok(layers)
        })
    }

    /// Most recent code snapshot and hash recorded for a component.
    pub fn latest_code_snapshot(
        &self,
        layer: &str,
        name: &str,
    ) -> Result<Option<(String, Option<String>)>, AnalyticsError> {
        self.with_conn(|conn| {
            let snapshot = conn
                .query_row(
                    "SELECT code_snapshot, code_hash FROM executions
                     WHERE context_type = ?1 AND context_name = ?2 AND code_snapshot IS NOT NULL
                     ORDER BY timestamp_us DESC LIMIT 1",
                    params![layer, name],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?;
            Ok(snapshot)
        })
    }

    /// Number of synced records.
    pub fn count(&self) -> Result<u64, AnalyticsError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM executions", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    /// Whether a record id has been synced.
    pub fn contains(&self, id: &str) -> Result<bool, AnalyticsError> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM executions WHERE id = ?1", params![id], |_| {
                    Ok(true)
                })
                .optional()?
                .unwrap_or(false);
            Ok(found)
        })
    }

    /// Close the database. Later calls fail with [`AnalyticsError::Closed`].
    pub fn close(&self) -> Result<(), AnalyticsError> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| AnalyticsError::from(e))?;
            info!("Closed analytics store");
        }
        Ok(())
    }
}

/// Build the WHERE clause and its positional parameters.
fn filter_clause(filter: &AggregateFilter) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(ref layer) = filter.context_type {
        clauses.push("context_type = ?");
        values.push(SqlValue::Text(layer.clone()));
    }
    if let Some(ref context_id) = filter.context_id {
        clauses.push("context_id = ?");
        values.push(SqlValue::Text(context_id.clone()));
    }
    if let Some(ref name) = filter.context_name {
        clauses.push("context_name = ?");
        values.push(SqlValue::Text(name.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(since) = filter.since {
        clauses.push("timestamp_us >= ?");
        values.push(SqlValue::Integer(since.timestamp_micros()));
    }
    if let Some(until) = filter.until {
        clauses.push("timestamp_us < ?");
        values.push(SqlValue::Integer(until.timestamp_micros()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComponentSummary> {
    let last_us: Option<i64> = row.get(12)?;
    Ok(ComponentSummary {
        layer: row.get(0)?,
        name: row.get(1)?,
        execution_count: row.get::<_, i64>(2)?.max(0) as u64,
        avg_duration_ms: row.get(3)?,
        min_duration_ms: row.get(4)?,
        max_duration_ms: row.get(5)?,
        total_duration_ms: row.get(6)?,
        avg_memory_mb: row.get(7)?,
        max_memory_mb: row.get(8)?,
        avg_cpu_percent: row.get(9)?,
        error_count: row.get::<_, i64>(10)?.max(0) as u64,
        success_count: row.get::<_, i64>(11)?.max(0) as u64,
        last_execution: last_us.and_then(DateTime::<Utc>::from_timestamp_micros),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::record::{layers, ExecutionStatus};

    fn record(layer: &str, name: &str, duration_ms: f64) -> ExecutionRecord {
        ExecutionRecord::new(layer, name)
            .with_id(ExecutionRecord::generate_id())
            .with_duration_ms(duration_ms)
    }

    #[test]
    fn test_aggregate_correctness() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let batch = vec![
            record(layers::TOOL, "x", 10.0),
            record(layers::TOOL, "x", 20.0),
            record(layers::TOOL, "x", 30.0),
            record(layers::TOOL, "y", 500.0),
        ];
        store.upsert_batch(&batch).unwrap();

        let rows = store
            .aggregate(&AggregateFilter::component(layers::TOOL, "x"), GroupBy::None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.count, 3);
        assert_eq!(row.avg_duration_ms, 20.0);
        assert_eq!(row.max_duration_ms, 30.0);
        assert_eq!(row.min_duration_ms, 10.0);
        assert_eq!(row.p50_duration_ms, 20.0);
        assert_eq!(row.p95_duration_ms, 30.0);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let batch = vec![record(layers::TOOL, "x", 1.0), record(layers::TOOL, "x", 2.0)];

        assert_eq!(store.upsert_batch(&batch).unwrap(), 2);
        assert_eq!(store.upsert_batch(&batch).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);

        let summary = store.component_summary(layers::TOOL, "x").unwrap().unwrap();
        assert_eq!(summary.execution_count, 2);
    }

    #[test]
    fn test_empty_filter_returns_no_rows() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let rows = store
            .aggregate(&AggregateFilter::component(layers::TOOL, "missing"), GroupBy::None)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_group_by_component_and_status() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store
            .upsert_batch(&[
                record(layers::TOOL, "a", 1.0),
                record(layers::TOOL, "a", 3.0).with_error("boom"),
                record(layers::TOOL, "b", 5.0).with_status(ExecutionStatus::Timeout),
                record(layers::STEP, "a", 7.0),
            ])
            .unwrap();

        let rows = store
            .aggregate(&AggregateFilter::layer(layers::TOOL), GroupBy::Component)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.component.as_deref(), Some("a"));
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].error_count, 1);
        assert_eq!(rows[0].success_count, 1);
        assert_eq!(rows[1].error_count, 1);

        let by_status = store.aggregate(&AggregateFilter::all(), GroupBy::Status).unwrap();
        let statuses: Vec<&str> = by_status
            .iter()
            .filter_map(|r| r.key.status.as_deref())
            .collect();
        assert_eq!(statuses, vec!["error", "success", "timeout"]);
    }

    #[test]
    fn test_filter_by_status_and_time() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert_batch(&[
                record(layers::TOOL, "a", 1.0).with_timestamp(now - Duration::hours(2)),
                record(layers::TOOL, "a", 2.0).with_timestamp(now),
                record(layers::TOOL, "a", 4.0)
                    .with_timestamp(now)
                    .with_error("bad"),
            ])
            .unwrap();

        let recent = store
            .aggregate(
                &AggregateFilter::component(layers::TOOL, "a")
                    .between(Some(now - Duration::hours(1)), None),
                GroupBy::None,
            )
            .unwrap();
        assert_eq!(recent[0].count, 2);

        let errors = store
            .aggregate(
                &AggregateFilter::component(layers::TOOL, "a").with_status(ExecutionStatus::Error),
                GroupBy::None,
            )
            .unwrap();
        assert_eq!(errors[0].count, 1);
        assert_eq!(errors[0].avg_duration_ms, 4.0);
    }

    #[test]
    fn test_summary_view_reflects_latest_batch() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store.upsert_batch(&[record(layers::TOOL, "a", 10.0)]).unwrap();
        store.upsert_batch(&[record(layers::TOOL, "a", 30.0)]).unwrap();

        let summary = store.component_summary(layers::TOOL, "a").unwrap().unwrap();
        assert_eq!(summary.execution_count, 2);
        assert_eq!(summary.avg_duration_ms, 20.0);
        assert_eq!(summary.max_duration_ms, 30.0);
        assert_eq!(summary.total_duration_ms, 40.0);
        assert!(summary.last_execution.is_some());
    }

    #[test]
    fn test_component_summaries_min_executions() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store
            .upsert_batch(&[
                record(layers::TOOL, "busy", 1.0),
                record(layers::TOOL, "busy", 1.0),
                record(layers::TOOL, "rare", 100.0),
            ])
            .unwrap();

        assert_eq!(store.component_summaries(1).unwrap().len(), 2);
        let busy = store.component_summaries(2).unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].name, "busy");
    }

    #[test]
    fn test_layer_summaries() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store
            .upsert_batch(&[
                record(layers::TOOL, "a", 10.0),
                record(layers::TOOL, "b", 30.0).with_error("x"),
                record(layers::STEP, "s", 5.0),
            ])
            .unwrap();

        let layers_summary = store.layer_summaries().unwrap();
        assert_eq!(layers_summary.len(), 2);
        let tool = layers_summary.iter().find(|l| l.layer == "tool").unwrap();
        assert_eq!(tool.component_count, 2);
        assert_eq!(tool.execution_count, 2);
        assert_eq!(tool.avg_duration_ms, 20.0);
        assert_eq!(tool.error_rate(), 0.5);
    }

    #[test]
    fn test_rebuild_summary() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        store
            .upsert_batch(&[record(layers::TOOL, "a", 1.0), record(layers::STEP, "b", 2.0)])
            .unwrap();
        assert_eq!(store.rebuild_summary().unwrap(), 2);
        assert_eq!(store.component_summaries(0).unwrap().len(), 2);
    }

    #[test]
    fn test_latest_code_snapshot() {
        let store = AnalyticsStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert_batch(&[
                record(layers::FUNCTION, "f", 1.0)
                    .with_timestamp(now - Duration::seconds(5))
                    .with_code("fn f() {}", "old"),
                record(layers::FUNCTION, "f", 1.0)
                    .with_timestamp(now)
                    .with_code("fn f() { fast() }", "new"),
                record(layers::FUNCTION, "f", 1.0),
            ])
            .unwrap();

        let (snapshot, hash) = store
            .latest_code_snapshot(layers::FUNCTION, "f")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot, "fn f() { fast() }");
        assert_eq!(hash.as_deref(), Some("new"));
        assert!(store.latest_code_snapshot(layers::TOOL, "f").unwrap().is_none());
    }

    #[test]
    fn test_persistence_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("analytics.db");
        let id = {
            let store = AnalyticsStore::open(&path).unwrap();
            let r = record(layers::TOOL, "a", 1.0);
            let id = r.id.clone();
            store.upsert_batch(&[r]).unwrap();
            store.close().unwrap();
            assert!(matches!(store.count().unwrap_err(), AnalyticsError::Closed));
            id
        };

        let store = AnalyticsStore::open(&path).unwrap();
        assert!(store.contains(&id).unwrap());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
