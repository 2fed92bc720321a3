// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`PipelineConfigFile`] is the on-disk form (JSON or YAML, every field
//! optional); [`PipelineConfig`] is the resolved form with defaults applied.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{PerformanceThreshold, ThresholdSet};
use crate::error::ConfigError;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 500;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 10_000;
pub const DEFAULT_MAX_AUDIT_HISTORY: usize = 100;

/// File name of the record store inside the data directory.
pub const RECORDS_FILE: &str = "records.redb";
/// File name of the analytics database inside the data directory.
pub const ANALYTICS_FILE: &str = "analytics.db";
/// File name of the optimization queue inside the data directory.
pub const QUEUE_FILE: &str = "optimization_queue.json";

/// Pipeline configuration as written in `.codi-perf.json` / `.codi-perf.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfigFile {
    /// Directory holding the stores and the queue file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Background sync period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_interval_ms: Option<u64>,

    /// Records per analytics upsert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_batch_size: Option<usize>,

    /// Upper bound on the final sync sweep at shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_ms: Option<u64>,

    /// Sample process memory, CPU and I/O around each call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_system_metrics: Option<bool>,

    /// Audit results kept in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_audit_history: Option<usize>,

    /// Per-layer threshold overrides, merged field by field into the defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<HashMap<String, PerformanceThreshold>>,
}

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub sync_interval_ms: u64,
    pub sync_batch_size: usize,
    pub shutdown_grace_ms: u64,
    pub capture_system_metrics: bool,
    pub max_audit_history: usize,
    #[serde(default)]
    pub thresholds: HashMap<String, PerformanceThreshold>,
}

impl PipelineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            capture_system_metrics: true,
            max_audit_history: DEFAULT_MAX_AUDIT_HISTORY,
            thresholds: HashMap::new(),
        }
    }

    pub fn with_sync_interval_ms(mut self, ms: u64) -> Self {
        self.sync_interval_ms = ms;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sync_batch_size = batch_size;
        self
    }

    pub fn with_system_metrics(mut self, enabled: bool) -> Self {
        self.capture_system_metrics = enabled;
        self
    }

    /// Override one layer's threshold, merged into its defaults.
    pub fn with_threshold(mut self, layer: impl Into<String>, threshold: PerformanceThreshold) -> Self {
        self.thresholds.insert(layer.into(), threshold);
        self
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_FILE)
    }

    pub fn analytics_path(&self) -> PathBuf {
        self.data_dir.join(ANALYTICS_FILE)
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Layer defaults with the configured overrides applied.
    pub fn threshold_set(&self) -> ThresholdSet {
        ThresholdSet::with_overrides(&self.thresholds)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "syncIntervalMs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.sync_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "syncBatchSize".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        for (layer, threshold) in &self.thresholds {
            for (name, rate) in [
                ("maxErrorRate", threshold.max_error_rate),
                ("minSuccessRate", threshold.min_success_rate),
            ] {
                if let Some(rate) = rate {
                    if !(0.0..=1.0).contains(&rate) {
                        return Err(ConfigError::InvalidValue {
                            field: format!("thresholds.{}.{}", layer, name),
                            message: format!("{} is not a fraction between 0 and 1", rate),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
