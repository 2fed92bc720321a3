// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-layer performance thresholds and their evaluation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::layers;

use super::types::ComponentMetrics;

/// Limits a component of one layer is expected to stay within.
///
/// Unset fields are not checked. A metric exactly equal to its limit passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceThreshold {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cpu_percent: Option<f64>,
    /// Fraction (0.0 to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_rate: Option<f64>,
    /// Fraction (0.0 to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,
}

impl PerformanceThreshold {
    /// No limits at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Built-in limits for a layer. Unknown layers get no limits.
    pub fn for_layer(layer: &str) -> Self {
        let (duration, memory, success) = match layer {
            layers::FUNCTION => (100.0, 50.0, 0.99),
            layers::TOOL => (1_000.0, 100.0, 0.95),
            layers::STEP => (5_000.0, 250.0, 0.95),
            layers::NODE => (10_000.0, 500.0, 0.90),
            layers::WORKFLOW => (60_000.0, 1_000.0, 0.90),
            _ => return Self::unbounded(),
        };
        Self {
            max_duration_ms: Some(duration),
            max_memory_mb: Some(memory),
            min_success_rate: Some(success),
            ..Default::default()
        }
    }

    pub fn with_max_duration_ms(mut self, value: f64) -> Self {
        self.max_duration_ms = Some(value);
        self
    }

    pub fn with_max_memory_mb(mut self, value: f64) -> Self {
        self.max_memory_mb = Some(value);
        self
    }

    pub fn with_max_cpu_percent(mut self, value: f64) -> Self {
        self.max_cpu_percent = Some(value);
        self
    }

    pub fn with_max_error_rate(mut self, value: f64) -> Self {
        self.max_error_rate = Some(value);
        self
    }

    pub fn with_min_success_rate(mut self, value: f64) -> Self {
        self.min_success_rate = Some(value);
        self
    }

    /// Overlay `overrides` onto `self`, field by field.
    pub fn merged_with(&self, overrides: &PerformanceThreshold) -> Self {
        Self {
            max_duration_ms: overrides.max_duration_ms.or(self.max_duration_ms),
            max_memory_mb: overrides.max_memory_mb.or(self.max_memory_mb),
            max_cpu_percent: overrides.max_cpu_percent.or(self.max_cpu_percent),
            max_error_rate: overrides.max_error_rate.or(self.max_error_rate),
            min_success_rate: overrides.min_success_rate.or(self.min_success_rate),
        }
    }

    /// Compare metrics against every configured limit.
    ///
    /// Averages are compared for duration, memory and CPU.
    pub fn evaluate(&self, metrics: &ComponentMetrics) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut check_max = |kind, actual: f64, limit: Option<f64>| {
            if let Some(limit) = limit {
                if actual > limit {
                    violations.push(Violation { kind, actual, limit });
                }
            }
        };
        check_max(ViolationKind::Duration, metrics.avg_duration_ms, self.max_duration_ms);
        check_max(ViolationKind::Memory, metrics.avg_memory_mb, self.max_memory_mb);
        check_max(ViolationKind::Cpu, metrics.avg_cpu_percent, self.max_cpu_percent);
        check_max(ViolationKind::ErrorRate, metrics.error_rate(), self.max_error_rate);

        if let Some(min) = self.min_success_rate {
            let actual = metrics.success_rate();
            if actual < min {
                violations.push(Violation {
                    kind: ViolationKind::SuccessRate,
                    actual,
                    limit: min,
                });
            }
        }
        violations
    }
}

/// Dimension a threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Duration,
    Memory,
    Cpu,
    ErrorRate,
    SuccessRate,
}

/// One exceeded limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub actual: f64,
    pub limit: f64,
}

impl Violation {
    /// How far past the limit the metric is, as a multiple of the limit.
    pub fn ratio(&self) -> f64 {
        if self.limit <= 0.0 {
            f64::INFINITY
        } else {
            self.actual / self.limit
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Duration => write!(
                f,
                "avg duration {:.1}ms exceeds max {:.1}ms",
                self.actual, self.limit
            ),
            ViolationKind::Memory => write!(
                f,
                "avg memory {:.1}MB exceeds max {:.1}MB",
                self.actual, self.limit
            ),
            ViolationKind::Cpu => write!(
                f,
                "avg cpu {:.1}% exceeds max {:.1}%",
                self.actual, self.limit
            ),
            ViolationKind::ErrorRate => write!(
                f,
                "error rate {:.1}% exceeds max {:.1}%",
                self.actual * 100.0,
                self.limit * 100.0
            ),
            ViolationKind::SuccessRate => write!(
                f,
                "success rate {:.1}% below min {:.1}%",
                self.actual * 100.0,
                self.limit * 100.0
            ),
        }
    }
}

/// Thresholds for every layer: built-in defaults plus overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    layers: HashMap<String, PerformanceThreshold>,
}

impl ThresholdSet {
    /// Built-in defaults for the standard layers.
    pub fn defaults() -> Self {
        let layers = layers::ALL
            .iter()
            .map(|layer| (layer.to_string(), PerformanceThreshold::for_layer(layer)))
            .collect();
        Self { layers }
    }

    /// Defaults with per-layer overrides merged field by field.
    pub fn with_overrides(overrides: &HashMap<String, PerformanceThreshold>) -> Self {
        let mut set = Self::defaults();
        for (layer, threshold) in overrides {
            set.merge(layer, threshold);
        }
        set
    }

    /// Merge `threshold` into whatever `layer` currently has.
    pub fn merge(&mut self, layer: &str, threshold: &PerformanceThreshold) {
        let merged = self.get(layer).merged_with(threshold);
        self.layers.insert(layer.to_string(), merged);
    }

    /// Replace a layer's threshold outright.
    pub fn set(&mut self, layer: impl Into<String>, threshold: PerformanceThreshold) {
        self.layers.insert(layer.into(), threshold);
    }

    /// Threshold for a layer; unknown layers are unbounded.
    pub fn get(&self, layer: &str) -> PerformanceThreshold {
        self.layers.get(layer).cloned().unwrap_or_default()
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(avg_duration_ms: f64) -> ComponentMetrics {
        ComponentMetrics {
            execution_count: 10,
            success_count: 10,
            avg_duration_ms,
            max_duration_ms: avg_duration_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_layer_defaults() {
        let tool = PerformanceThreshold::for_layer(layers::TOOL);
        assert_eq!(tool.max_duration_ms, Some(1000.0));
        assert_eq!(tool.min_success_rate, Some(0.95));

        let function = PerformanceThreshold::for_layer(layers::FUNCTION);
        assert_eq!(function.max_duration_ms, Some(100.0));
        assert_ne!(function, PerformanceThreshold::for_layer(layers::WORKFLOW));

        assert_eq!(PerformanceThreshold::for_layer("custom"), PerformanceThreshold::unbounded());
    }

    #[test]
    fn test_boundary_is_not_a_violation() {
        let threshold = PerformanceThreshold::unbounded().with_max_duration_ms(1000.0);
        assert!(threshold.evaluate(&metrics(1000.0)).is_empty());

        let violations = threshold.evaluate(&metrics(1001.0));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Duration);
    }

    #[test]
    fn test_success_rate_boundary() {
        let threshold = PerformanceThreshold::unbounded().with_min_success_rate(0.9);
        let mut m = metrics(1.0);
        m.success_count = 9;
        m.error_count = 1;
        assert!(threshold.evaluate(&m).is_empty());

        m.success_count = 8;
        m.error_count = 2;
        let violations = threshold.evaluate(&m);
        assert_eq!(violations[0].to_string(), "success rate 80.0% below min 90.0%");
    }

    #[test]
    fn test_violation_messages() {
        let v = Violation {
            kind: ViolationKind::Duration,
            actual: 1200.0,
            limit: 1000.0,
        };
        assert_eq!(v.to_string(), "avg duration 1200.0ms exceeds max 1000.0ms");
        assert_eq!(v.ratio(), 1.2);

        let v = Violation {
            kind: ViolationKind::ErrorRate,
            actual: 0.5,
            limit: 0.1,
        };
        assert_eq!(v.to_string(), "error rate 50.0% exceeds max 10.0%");
    }

    #[test]
    fn test_overrides_merge_field_by_field() {
        let mut overrides = HashMap::new();
        overrides.insert(
            layers::TOOL.to_string(),
            PerformanceThreshold::unbounded().with_max_duration_ms(250.0),
        );
        overrides.insert(
            "agent".to_string(),
            PerformanceThreshold::unbounded().with_max_cpu_percent(80.0),
        );

        let set = ThresholdSet::with_overrides(&overrides);
        let tool = set.get(layers::TOOL);
        assert_eq!(tool.max_duration_ms, Some(250.0));
        assert_eq!(tool.max_memory_mb, Some(100.0));
        assert_eq!(set.get("agent").max_cpu_percent, Some(80.0));
        assert_eq!(set.get("unknown"), PerformanceThreshold::unbounded());
    }

    #[test]
    fn test_threshold_serde_camel_case() {
        let json = r#"{"maxDurationMs": 500, "minSuccessRate": 0.9}"#;
        let threshold: PerformanceThreshold = serde_json::from_str(json).unwrap();
        assert_eq!(threshold.max_duration_ms, Some(500.0));
        assert_eq!(threshold.min_success_rate, Some(0.9));
        assert!(threshold.max_memory_mb.is_none());
    }
}
