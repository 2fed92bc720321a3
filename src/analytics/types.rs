// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query and summary types for the analytics store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ExecutionStatus;

/// Row filter for aggregate queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateFilter {
    pub context_type: Option<String>,
    pub context_id: Option<String>,
    pub context_name: Option<String>,
    pub status: Option<ExecutionStatus>,
    /// Inclusive lower bound on the record timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the record timestamp.
    pub until: Option<DateTime<Utc>>,
}

impl AggregateFilter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match one component of a layer.
    pub fn component(layer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            context_type: Some(layer.into()),
            context_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Match every component of a layer.
    pub fn layer(layer: impl Into<String>) -> Self {
        Self {
            context_type: Some(layer.into()),
            ..Default::default()
        }
    }

    /// Restrict to one context id.
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Restrict to one status.
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to a time window.
    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

/// Grouping for aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One row over all matching records.
    None,
    /// One row per layer.
    Layer,
    /// One row per `(layer, name)`.
    Component,
    /// One row per `(layer, context id)`.
    ContextId,
    /// One row per status.
    Status,
}

impl GroupBy {
    /// Columns selected and grouped on, in key order.
    pub(crate) fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Layer => &["context_type"],
            Self::Component => &["context_type", "context_name"],
            Self::ContextId => &["context_type", "context_id"],
            Self::Status => &["status"],
        }
    }
}

/// Grouping key of an aggregate row. Fields not part of the grouping are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub layer: Option<String>,
    /// Component name or context id, depending on the grouping.
    pub component: Option<String>,
    pub status: Option<String>,
}

impl GroupKey {
    pub(crate) fn from_values(group_by: GroupBy, values: Vec<String>) -> Self {
        let mut values = values.into_iter();
        match group_by {
            GroupBy::None => Self::default(),
            GroupBy::Layer => Self {
                layer: values.next(),
                ..Default::default()
            },
            GroupBy::Component | GroupBy::ContextId => Self {
                layer: values.next(),
                component: values.next(),
                status: None,
            },
            GroupBy::Status => Self {
                status: values.next(),
                ..Default::default()
            },
        }
    }
}

/// Aggregated figures over a group of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub error_count: u64,
    pub success_count: u64,
}

impl AggregateRow {
    /// Fraction of failed executions (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.count as f64
        }
    }

    /// Fraction of successful executions (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.count as f64
        }
    }
}

/// One row of the materialized summary view, keyed by `(layer, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub layer: String,
    pub name: String,
    pub execution_count: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub total_duration_ms: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub error_count: u64,
    pub success_count: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ComponentSummary {
    /// Fraction of failed executions (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.execution_count as f64
        }
    }
}

/// Per-layer totals derived from the summary view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub layer: String,
    pub component_count: u64,
    pub execution_count: u64,
    pub avg_duration_ms: f64,
    pub total_duration_ms: f64,
    pub error_count: u64,
}

impl LayerSummary {
    /// Fraction of failed executions (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.execution_count as f64
        }
    }
}

/// Nearest-rank percentile of an ascending-sorted slice.
///
/// Deterministic for a given input set. Returns 0.0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 50.0), 50.0);
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&values, 99.0), 99.0);
        assert_eq!(percentile(&values, 100.0), 100.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
    }

    #[test]
    fn test_percentile_small_sets() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0], 50.0), 20.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0], 95.0), 30.0);
    }

    #[test]
    fn test_group_key_from_values() {
        let key = GroupKey::from_values(
            GroupBy::Component,
            vec!["tool".to_string(), "grep".to_string()],
        );
        assert_eq!(key.layer.as_deref(), Some("tool"));
        assert_eq!(key.component.as_deref(), Some("grep"));
        assert!(key.status.is_none());

        let key = GroupKey::from_values(GroupBy::Status, vec!["error".to_string()]);
        assert_eq!(key.status.as_deref(), Some("error"));
    }

    #[test]
    fn test_rates() {
        let row = AggregateRow {
            count: 4,
            error_count: 1,
            success_count: 3,
            ..Default::default()
        };
        assert_eq!(row.error_rate(), 0.25);
        assert_eq!(row.success_rate(), 0.75);
        assert_eq!(AggregateRow::default().error_rate(), 0.0);
    }
}
