// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Audit result and optimization queue types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::AggregateRow;

use super::thresholds::PerformanceThreshold;

/// Violation reported when a component has no recorded executions.
pub const NO_METRICS_VIOLATION: &str = "no metrics collected";

/// Where a component stands in the audit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditState {
    /// Never audited, or audited without any data.
    NotAudited,
    Passed,
    /// Failed its last audit but is not in the queue.
    Failed,
    /// Waiting in the optimization queue.
    Queued,
}

impl AuditState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAudited => "not_audited",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Queued => "queued",
        }
    }
}

impl std::fmt::Display for AuditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated metrics an audit compares against its threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetrics {
    pub execution_count: u64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub error_count: u64,
    pub success_count: u64,
}

impl ComponentMetrics {
    /// Fraction of failed executions (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.execution_count as f64
        }
    }

    /// Fraction of successful executions (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.execution_count as f64
        }
    }
}

impl From<&AggregateRow> for ComponentMetrics {
    fn from(row: &AggregateRow) -> Self {
        Self {
            execution_count: row.count,
            avg_duration_ms: row.avg_duration_ms,
            max_duration_ms: row.max_duration_ms,
            p95_duration_ms: row.p95_duration_ms,
            avg_memory_mb: row.avg_memory_mb,
            max_memory_mb: row.max_memory_mb,
            avg_cpu_percent: row.avg_cpu_percent,
            error_count: row.error_count,
            success_count: row.success_count,
        }
    }
}

/// Improvement goals for a queued component. Unset fields have no goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,
}

/// Outcome of auditing one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub component_name: String,
    pub layer: String,
    pub passed: bool,
    pub violations: Vec<String>,
    pub metrics: ComponentMetrics,
    pub threshold: PerformanceThreshold,
    /// Set when the component failed with data available.
    pub priority: Option<u8>,
    pub recommendation: Option<String>,
    pub audited_at: DateTime<Utc>,
}

impl AuditResult {
    /// Whether any executions were available to audit.
    pub fn has_data(&self) -> bool {
        self.metrics.execution_count > 0
    }

    /// Whether this result produced an optimization candidate.
    pub fn is_queued(&self) -> bool {
        !self.passed && self.has_data()
    }
}

/// A component waiting for optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationCandidate {
    pub component_name: String,
    pub layer: String,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub violations: Vec<String>,
    pub current_metrics: ComponentMetrics,
    pub target_metrics: TargetMetrics,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizationCandidate {
    /// Whether this candidate describes the given component.
    pub fn matches(&self, component_name: &str, layer: &str) -> bool {
        self.component_name == component_name && self.layer == layer
    }
}
