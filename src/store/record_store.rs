// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! redb-backed record store.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use redb::{Database, ReadableTable, ReadableTableMetadata, WriteTransaction};
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::record::ExecutionRecord;

use super::tables::{
    context_key, context_prefix, prefix_end, time_key, CONTEXT_INDEX, META, NEXT_PENDING_SEQ,
    PENDING, PENDING_IDS, RECORDS, TIME_INDEX,
};
use super::RecordSink;

/// A record waiting to be mirrored into the analytics store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    /// Position in the pending queue.
    pub seq: u64,
    /// The record itself.
    pub record: ExecutionRecord,
}

impl PendingRecord {
    /// Record id.
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Durable, append-only store for execution records.
///
/// Every write commits the record, its index entries, and its pending-sync
/// marker in a single transaction.
pub struct RecordStore {
    db: RwLock<Option<Database>>,
    path: PathBuf,
}

impl RecordStore {
    /// Open or create a record store at the given path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        // Create every table up front so read transactions never miss one.
        let txn = db.begin_write()?;
        Self::ensure_tables(&txn)?;
        txn.commit()?;

        info!(path = %path.display(), "Opened record store");

        Ok(Self {
            db: RwLock::new(Some(db)),
            path: path.to_path_buf(),
        })
    }

    fn ensure_tables(txn: &WriteTransaction) -> Result<(), StorageError> {
        txn.open_table(RECORDS)?;
        txn.open_table(CONTEXT_INDEX)?;
        txn.open_table(TIME_INDEX)?;
        txn.open_table(PENDING)?;
        txn.open_table(PENDING_IDS)?;
        txn.open_table(META)?;
        Ok(())
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the open database, failing if the store is closed.
    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(StorageError::Closed),
        }
    }

    /// Persist a record and return its id.
    ///
    /// An id is generated when the record has none. Payloads are clipped to
    /// the size bounds before serialization. Writing an id that already
    /// exists fails with [`StorageError::DuplicateId`]; records are never
    /// overwritten.
    #[instrument(level = "debug", skip(self, record), fields(context_type = %record.context_type, context_id = %record.context_id))]
    pub fn write(&self, mut record: ExecutionRecord) -> Result<String, StorageError> {
        if record.id.is_empty() {
            record.id = ExecutionRecord::generate_id();
        }
        record.enforce_bounds();

        let bytes = serde_json::to_vec(&record)?;
        let timestamp_us = record.timestamp_micros();
        let index_key = context_key(
            &record.context_type,
            &record.context_id,
            timestamp_us,
            &record.id,
        );
        let chrono_key = time_key(timestamp_us, &record.id);
        let id = record.id.as_str();

        self.with_db(|db| {
            let txn = db.begin_write()?;
            {
                let mut records = txn.open_table(RECORDS)?;
                if records.get(id)?.is_some() {
                    return Err(StorageError::DuplicateId(id.to_string()));
                }
                records.insert(id, bytes.as_slice())?;

                let mut index = txn.open_table(CONTEXT_INDEX)?;
                index.insert(index_key.as_str(), id)?;

                let mut time_index = txn.open_table(TIME_INDEX)?;
                time_index.insert(chrono_key.as_str(), id)?;

                let mut meta = txn.open_table(META)?;
                let seq = meta.get(NEXT_PENDING_SEQ)?.map(|g| g.value()).unwrap_or(0);
                meta.insert(NEXT_PENDING_SEQ, seq + 1)?;

                let mut pending = txn.open_table(PENDING)?;
                pending.insert(seq, id)?;

                let mut pending_ids = txn.open_table(PENDING_IDS)?;
                pending_ids.insert(id, seq)?;
            }
            txn.commit()?;
            Ok(())
        })?;

        debug!(id = %record.id, bytes = bytes.len(), "Record written");
        Ok(record.id)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Result<ExecutionRecord, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let records = txn.open_table(RECORDS)?;
            let guard = records
                .get(id)?
                .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
            let record = serde_json::from_slice(guard.value())?;
            Ok(record)
        })
    }

    /// Get the most recent records for a context, newest first.
    ///
    /// Uses the context index, so the cost is proportional to the number of
    /// matching entries rather than the size of the store.
    pub fn query_by_context(
        &self,
        context_type: &str,
        context_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let prefix = context_prefix(context_type, context_id);
        let end = prefix_end(&prefix);

        self.with_db(|db| {
            let txn = db.begin_read()?;
            let index = txn.open_table(CONTEXT_INDEX)?;
            let records = txn.open_table(RECORDS)?;

            let mut results = Vec::new();
            for entry in index.range(prefix.as_str()..end.as_str())?.rev() {
                if results.len() >= limit {
                    break;
                }
                let (_, id) = entry?;
                let id = id.value();
                let guard = records
                    .get(id)?
                    .ok_or_else(|| StorageError::Corrupt(format!("index points at missing record {}", id)))?;
                results.push(serde_json::from_slice(guard.value())?);
            }
            Ok(results)
        })
    }

    /// Get the most recent records across all contexts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let index = txn.open_table(TIME_INDEX)?;
            let records = txn.open_table(RECORDS)?;

            let mut results = Vec::new();
            for entry in index.iter()?.rev().take(limit) {
                let (_, id) = entry?;
                if let Some(guard) = records.get(id.value())? {
                    results.push(serde_json::from_slice(guard.value())?);
                }
            }
            Ok(results)
        })
    }

    /// Read up to `batch_size` pending records in the order they were marked.
    ///
    /// Reads from a snapshot, so concurrent writes are neither lost nor
    /// returned twice: they land after the snapshot and are picked up by a
    /// later call.
    ///
    /// A record that no longer decodes is skipped with a warning and its
    /// marker is dropped, so it cannot stall the records queued behind it.
    /// The record itself stays in the store.
    pub fn drain_pending(&self, batch_size: usize) -> Result<Vec<PendingRecord>, StorageError> {
        let (batch, unreadable) = self.with_db(|db| {
            let txn = db.begin_read()?;
            let pending = txn.open_table(PENDING)?;
            let records = txn.open_table(RECORDS)?;

            let mut batch = Vec::with_capacity(batch_size.min(1024));
            let mut unreadable = Vec::new();
            for entry in pending.iter()? {
                if batch.len() >= batch_size {
                    break;
                }
                let (seq, id) = entry?;
                let id = id.value();
                let guard = records
                    .get(id)?
                    .ok_or_else(|| StorageError::Corrupt(format!("pending marker for missing record {}", id)))?;
                match serde_json::from_slice::<ExecutionRecord>(guard.value()) {
                    Ok(record) => batch.push(PendingRecord {
                        seq: seq.value(),
                        record,
                    }),
                    Err(err) => {
                        warn!(id, error = %err, "Skipping unreadable pending record");
                        unreadable.push(id.to_string());
                    }
                }
            }
            Ok((batch, unreadable))
        })?;

        if !unreadable.is_empty() {
            self.clear_pending(&unreadable)?;
        }
        Ok(batch)
    }

    /// Remove pending markers for the given ids. Returns how many were cleared.
    ///
    /// Ids that are not pending are ignored.
    pub fn clear_pending<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let cleared = self.with_db(|db| {
            let txn = db.begin_write()?;
            let mut cleared = 0;
            {
                let mut pending_ids = txn.open_table(PENDING_IDS)?;
                let mut pending = txn.open_table(PENDING)?;
                for id in ids {
                    let seq = pending_ids.remove(id.as_ref())?.map(|g| g.value());
                    if let Some(seq) = seq {
                        pending.remove(seq)?;
                        cleared += 1;
                    }
                }
            }
            txn.commit()?;
            Ok(cleared)
        })?;

        debug!(cleared, "Cleared pending markers");
        Ok(cleared)
    }

    /// Whether a record is still waiting to be synchronized.
    pub fn is_pending(&self, id: &str) -> Result<bool, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let pending_ids = txn.open_table(PENDING_IDS)?;
            Ok(pending_ids.get(id)?.is_some())
        })
    }

    /// Number of records waiting to be synchronized.
    pub fn pending_count(&self) -> Result<u64, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let pending = txn.open_table(PENDING)?;
            Ok(pending.len()?)
        })
    }

    /// Total number of stored records.
    pub fn len(&self) -> Result<u64, StorageError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let records = txn.open_table(RECORDS)?;
            Ok(records.len()?)
        })
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Close the store. Every later call fails with [`StorageError::Closed`].
    ///
    /// Commits are durable when they return, so closing only releases the
    /// database file. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.db.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = guard.take() {
            drop(db);
            info!(path = %self.path.display(), "Closed record store");
        }
        Ok(())
    }
}

impl RecordSink for RecordStore {
    fn write_record(&self, record: ExecutionRecord) -> Result<String, StorageError> {
        self.write(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::record::{layers, Payload, TRUNCATION_MARKER};

    fn create_test_store() -> (RecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(&temp_dir.path().join("records.redb")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_write_and_get() {
        let (store, _dir) = create_test_store();
        let record = ExecutionRecord::new(layers::TOOL, "read_file")
            .with_duration_ms(42.0)
            .with_metadata("thread_count", 3);

        let id = store.write(record.clone()).unwrap();
        assert!(!id.is_empty());

        let stored = store.get(&id).unwrap();
        assert_eq!(stored, record.with_id(id));
    }

    #[test]
    fn test_write_keeps_explicit_id() {
        let (store, _dir) = create_test_store();
        let id = store
            .write(ExecutionRecord::new(layers::STEP, "plan").with_id("fixed-id"))
            .unwrap();
        assert_eq!(id, "fixed-id");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (store, _dir) = create_test_store();
        let record = ExecutionRecord::new(layers::TOOL, "grep").with_id("dup");
        store.write(record.clone()).unwrap();

        let err = store.write(record.with_duration_ms(99.0)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(_)));

        // The first record is untouched and only one marker exists.
        assert_eq!(store.get("dup").unwrap().duration_ms, 0.0);
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_get_missing() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.get("nope").unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[test]
    fn test_write_applies_bounds() {
        let (store, _dir) = create_test_store();
        let mut request = Payload::new();
        request.insert("content".to_string(), json!("x".repeat(1000)));
        let id = store
            .write(ExecutionRecord::new(layers::TOOL, "write_file").with_request(request))
            .unwrap();

        let stored = store.get(&id).unwrap();
        let content = stored.request_data["content"].as_str().unwrap();
        assert!(content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_query_by_context_newest_first() {
        let (store, _dir) = create_test_store();
        let base = Utc::now();
        for i in 0..5 {
            let record = ExecutionRecord::new(layers::TOOL, "grep")
                .with_timestamp(base + Duration::seconds(i))
                .with_duration_ms(i as f64);
            store.write(record).unwrap();
        }
        store
            .write(ExecutionRecord::new(layers::TOOL, "glob"))
            .unwrap();

        let results = store.query_by_context(layers::TOOL, "grep", 3).unwrap();
        let durations: Vec<f64> = results.iter().map(|r| r.duration_ms).collect();
        assert_eq!(durations, vec![4.0, 3.0, 2.0]);

        let all = store.query_by_context(layers::TOOL, "grep", 100).unwrap();
        assert_eq!(all.len(), 5);
        assert!(store.query_by_context(layers::STEP, "grep", 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_your_own_writes() {
        let (store, _dir) = create_test_store();
        let id = store.write(ExecutionRecord::new(layers::NODE, "n1")).unwrap();
        let results = store.query_by_context(layers::NODE, "n1", 1).unwrap();
        assert_eq!(results[0].id, id);
    }

    #[test]
    fn test_recent_across_contexts() {
        let (store, _dir) = create_test_store();
        let base = Utc::now();
        store
            .write(ExecutionRecord::new(layers::TOOL, "a").with_timestamp(base))
            .unwrap();
        store
            .write(
                ExecutionRecord::new(layers::STEP, "b")
                    .with_timestamp(base + Duration::seconds(1)),
            )
            .unwrap();

        let recent = store.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].context_name, "b");
    }

    #[test]
    fn test_pending_lifecycle() {
        let (store, _dir) = create_test_store();
        let first = store.write(ExecutionRecord::new(layers::TOOL, "a")).unwrap();
        let second = store.write(ExecutionRecord::new(layers::TOOL, "b")).unwrap();

        assert!(store.is_pending(&first).unwrap());
        let batch = store.drain_pending(10).unwrap();
        let ids: Vec<&str> = batch.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);

        // Draining does not clear.
        assert_eq!(store.pending_count().unwrap(), 2);

        assert_eq!(store.clear_pending(&[first.clone()]).unwrap(), 1);
        assert!(!store.is_pending(&first).unwrap());
        assert!(store.is_pending(&second).unwrap());

        // Clearing twice is harmless.
        assert_eq!(store.clear_pending(&[first.clone()]).unwrap(), 0);

        // Synced records stay readable.
        assert_eq!(store.get(&first).unwrap().context_name, "a");
    }

    #[test]
    fn test_drain_respects_batch_size() {
        let (store, _dir) = create_test_store();
        for _ in 0..7 {
            store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();
        }
        assert_eq!(store.drain_pending(3).unwrap().len(), 3);
        assert_eq!(store.drain_pending(100).unwrap().len(), 7);
    }

    #[test]
    fn test_non_finite_metrics_stay_readable() {
        let (store, _dir) = create_test_store();
        let id = store
            .write(ExecutionRecord::new(layers::TOOL, "t").with_cpu_percent(f64::NAN))
            .unwrap();

        let stored = store.get(&id).unwrap();
        assert_eq!(stored.cpu_percent, 0.0);
        assert_eq!(store.drain_pending(10).unwrap().len(), 1);
    }

    #[test]
    fn test_drain_skips_unreadable_record() {
        let (store, _dir) = create_test_store();
        let bad = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();
        let good = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();

        // Overwrite the stored bytes with something that no longer decodes.
        store
            .with_db(|db| {
                let txn = db.begin_write()?;
                {
                    let mut records = txn.open_table(RECORDS)?;
                    records.insert(bad.as_str(), b"{\"id\":null}".as_slice())?;
                }
                txn.commit()?;
                Ok(())
            })
            .unwrap();

        let batch = store.drain_pending(1).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), good);
        assert!(!store.is_pending(&bad).unwrap());
        assert!(store.is_pending(&good).unwrap());
    }

    #[test]
    fn test_writes_during_drain_not_lost() {
        let (store, _dir) = create_test_store();
        let first = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();
        let batch = store.drain_pending(10).unwrap();
        let late = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();

        let ids: Vec<String> = batch.iter().map(|p| p.id().to_string()).collect();
        store.clear_pending(&ids).unwrap();

        assert!(!store.is_pending(&first).unwrap());
        assert!(store.is_pending(&late).unwrap());
        let next = store.drain_pending(10).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id(), late);
    }

    #[test]
    fn test_concurrent_writes() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .write(ExecutionRecord::new(layers::TOOL, format!("t{}", t)).with_duration_ms(i as f64))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 80);
        assert_eq!(store.pending_count().unwrap(), 80);
    }

    #[test]
    fn test_reopen_preserves_records_and_markers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.redb");

        let id = {
            let store = RecordStore::open(&path).unwrap();
            let id = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();
            store.close().unwrap();
            id
        };

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.get(&id).unwrap().id, id);
        assert!(store.is_pending(&id).unwrap());

        // Sequence numbers continue after reopen.
        let next = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap();
        let batch = store.drain_pending(10).unwrap();
        assert_eq!(batch[1].id(), next);
        assert!(batch[1].seq > batch[0].seq);
    }

    #[test]
    fn test_close_rejects_calls() {
        let (store, _dir) = create_test_store();
        store.close().unwrap();
        assert!(store.is_closed());

        let err = store.write(ExecutionRecord::new(layers::TOOL, "t")).unwrap_err();
        assert!(err.is_closed());
        assert!(store.clear_pending(&["x"]).unwrap_err().is_closed());
        assert!(store.close().is_ok());
    }
}
