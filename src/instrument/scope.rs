// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! RAII guard measuring one execution.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::record::{bounded_payload, component_identity, ExecutionRecord, ExecutionStatus, Payload};
use crate::store::RecordSink;

use super::context;
use super::sampler::{ResourceSampler, ResourceSnapshot, ResourceUsage};

/// Source text of the code that ran, with its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnapshot {
    pub source: String,
    pub hash: String,
}

impl CodeSnapshot {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        Self { source, hash }
    }

    /// First 12 hex characters of the digest, or the whole hash if shorter.
    pub fn short_hash(&self) -> &str {
        self.hash.get(..12).unwrap_or(&self.hash)
    }
}

/// Measures one execution from creation until it is finished or dropped.
///
/// Exactly one record is written per scope. A scope dropped without an
/// explicit finish (early return, panic, cancelled future) still writes an
/// `error` record, so no exit path goes unmeasured.
///
/// Scopes created with [`Collector::begin`](super::Collector::begin) become
/// the parent of nested calls on the same thread until they complete.
pub struct ExecutionScope {
    sink: Arc<dyn RecordSink>,
    sampler: Arc<ResourceSampler>,
    record: Option<ExecutionRecord>,
    identity: String,
    started: Instant,
    baseline: ResourceSnapshot,
    stack_thread: Option<ThreadId>,
}

impl ExecutionScope {
    pub(crate) fn start(
        sink: Arc<dyn RecordSink>,
        sampler: Arc<ResourceSampler>,
        layer: &str,
        name: &str,
        on_stack: bool,
    ) -> Self {
        let identity = component_identity(layer, name);
        let mut record = ExecutionRecord::new(layer, name);
        record.parent_context = context::current_parent();

        let stack_thread = if on_stack {
            context::push(&identity);
            Some(thread::current().id())
        } else {
            None
        };

        let baseline = sampler.sample();
        Self {
            sink,
            sampler,
            record: Some(record),
            identity,
            started: Instant::now(),
            baseline,
            stack_thread,
        }
    }

    /// `layer:name` of the component being measured.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Parent identity captured at start.
    pub fn parent(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.parent_context.as_deref())
    }

    fn update(mut self, f: impl FnOnce(&mut ExecutionRecord)) -> Self {
        if let Some(record) = self.record.as_mut() {
            f(record);
        }
        self
    }

    pub fn with_request(self, request: Payload) -> Self {
        self.update(|r| r.request_data = request)
    }

    /// Record bounded arguments under `args`.
    pub fn with_args<A: Serialize + ?Sized>(self, args: &A) -> Self {
        self.with_request(bounded_payload("args", args))
    }

    pub fn with_context_id(self, context_id: impl Into<String>) -> Self {
        let context_id = context_id.into();
        self.update(|r| r.context_id = context_id)
    }

    /// Override the parent captured from the calling context.
    pub fn with_parent(self, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        self.update(|r| r.parent_context = Some(parent))
    }

    pub fn with_code(self, snapshot: &CodeSnapshot) -> Self {
        self.update(|r| {
            r.code_snapshot = Some(snapshot.source.clone());
            r.code_hash = Some(snapshot.hash.clone());
        })
    }

    pub fn with_variant(self, variant_id: impl Into<String>) -> Self {
        let variant_id = variant_id.into();
        self.update(|r| r.variant_id = Some(variant_id))
    }

    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        self.update(|r| {
            r.metadata.insert(key, value);
        })
    }

    /// Finish successfully, recording a bounded view of `response`.
    pub fn finish_ok<T: Serialize + ?Sized>(mut self, response: &T) -> Result<String, StorageError> {
        self.complete(ExecutionStatus::Success, None, bounded_payload("result", response))
    }

    /// Finish with `status = error`.
    pub fn finish_err(mut self, message: impl Into<String>) -> Result<String, StorageError> {
        self.complete(ExecutionStatus::Error, Some(message.into()), Payload::new())
    }

    /// Finish with an explicit status, e.g. a caller-imposed timeout.
    pub fn finish_with_status(
        mut self,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<String, StorageError> {
        self.complete(status, error, Payload::new())
    }

    fn leave_stack(&mut self) {
        if let Some(thread_id) = self.stack_thread.take() {
            if thread_id == thread::current().id() {
                context::pop(&self.identity);
            }
        }
    }

    fn complete(
        &mut self,
        status: ExecutionStatus,
        error: Option<String>,
        response: Payload,
    ) -> Result<String, StorageError> {
        self.leave_stack();
        let Some(mut record) = self.record.take() else {
            return Err(StorageError::Corrupt(format!(
                "execution scope {} already completed",
                self.identity
            )));
        };

        let usage = ResourceUsage::between(&self.baseline, &self.sampler.sample());
        record.duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        record.memory_mb = usage.memory_mb;
        record.cpu_percent = usage.cpu_percent;
        record.status = status;
        record.error = error;
        record.response_data = response;

        let metadata = &mut record.metadata;
        metadata.insert("rss_mb".into(), usage.rss_mb.into());
        metadata.insert("peak_memory_mb".into(), usage.peak_memory_mb.into());
        metadata.insert("io_read_bytes".into(), usage.io_read_bytes.into());
        metadata.insert("io_write_bytes".into(), usage.io_write_bytes.into());
        metadata.insert("thread_count".into(), usage.thread_count.into());
        metadata.insert("memory_pressure".into(), usage.memory_pressure.as_str().into());
        metadata.insert(
            "thread_name".into(),
            thread::current().name().unwrap_or("unnamed").into(),
        );

        let duration_ms = record.duration_ms;
        match self.sink.write_record(record) {
            Ok(id) => {
                debug!(component = %self.identity, %status, duration_ms, "Captured execution");
                Ok(id)
            }
            Err(e) => {
                warn!(component = %self.identity, error = %e, "Failed to persist execution record");
                Err(e)
            }
        }
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        if self.record.is_some() {
            let reason = if thread::panicking() {
                "panicked"
            } else {
                "dropped before completion"
            };
            let _ = self.complete(ExecutionStatus::Error, Some(reason.to_string()), Payload::new());
        }
    }
}
