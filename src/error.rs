// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the telemetry pipeline.
//!
//! Each stage of the pipeline has its own strongly-typed error, defined with
//! `thiserror`. Glue code and the binary use `anyhow` for propagation.

use thiserror::Error;

/// Errors raised by the record store (the durable write path).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    DuplicateId(String),

    #[error("Record store is closed")]
    Closed,

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record store: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl StorageError {
    /// Check if this error means the store can no longer accept calls.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Errors raised by the analytics store (the query path).
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Analytics database error: {0}")]
    Database(String),

    #[error("Analytics store is closed")]
    Closed,

    #[error("Payload encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors raised while mirroring records into the analytics store.
///
/// A failed batch keeps its pending markers, so every variant is
/// recoverable by running the synchronizer again.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to drain pending records: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to upsert batch of {batch_size} records: {source}")]
    Upsert {
        batch_size: usize,
        #[source]
        source: AnalyticsError,
    },

    #[error("Synchronizer task failed: {0}")]
    Task(String),
}

/// Errors raised while loading or saving the optimization queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue file is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to save queue: {0}")]
    SaveFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors raised by an audit run.
///
/// Missing data is not an error; it is reported as a failed
/// [`AuditResult`](crate::audit::AuditResult) instead.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Aggregate query failed: {0}")]
    Query(#[from] AnalyticsError),

    #[error("Optimization queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors surfaced by the [`Pipeline`](crate::pipeline::Pipeline) facade.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("Background sync is already running")]
    AlreadyRunning,
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_is_closed() {
        assert!(StorageError::Closed.is_closed());
        assert!(!StorageError::NotFound("abc".to_string()).is_closed());
    }

    #[test]
    fn test_storage_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: StorageError = result.unwrap_err().into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_sync_error_from_storage() {
        let err: SyncError = StorageError::Closed.into();
        assert!(matches!(err, SyncError::Storage(StorageError::Closed)));
    }

    #[test]
    fn test_upsert_error_display() {
        let err = SyncError::Upsert {
            batch_size: 42,
            source: AnalyticsError::Database("disk I/O error".to_string()),
        };
        let display = err.to_string();
        assert!(display.contains("42"));
        assert!(display.contains("disk I/O error"));
    }

    #[test]
    fn test_audit_error_from_queue() {
        let err: AuditError = QueueError::Corrupt("bad".to_string()).into();
        assert!(matches!(err, AuditError::Queue(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
