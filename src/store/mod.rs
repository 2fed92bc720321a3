// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Record store: the durable, write-optimized tier.
//!
//! Records are appended to an embedded redb database together with a
//! context index and a pending-sync marker. The synchronizer drains the
//! markers into the analytics store.
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_perf::record::{layers, ExecutionRecord};
//! use codi_perf::store::RecordStore;
//!
//! let store = RecordStore::open(Path::new("records.redb"))?;
//! let id = store.write(ExecutionRecord::new(layers::TOOL, "grep").with_duration_ms(3.2))?;
//! let latest = store.query_by_context(layers::TOOL, "grep", 10)?;
//! ```

pub mod record_store;
pub mod tables;

pub use record_store::{PendingRecord, RecordStore};

use crate::error::StorageError;
use crate::record::ExecutionRecord;

/// Destination for captured execution records.
///
/// Implemented by [`RecordStore`]; the collector writes through this trait
/// so it can be pointed at any durable sink.
pub trait RecordSink: Send + Sync {
    /// Persist a record and return its id.
    fn write_record(&self, record: ExecutionRecord) -> Result<String, StorageError>;
}
