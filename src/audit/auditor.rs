// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Threshold evaluation and optimization queueing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::analytics::{AggregateFilter, AnalyticsStore, GroupBy};
use crate::error::AuditError;
use crate::sync::Synchronizer;

use super::queue::OptimizationQueue;
use super::thresholds::{PerformanceThreshold, ThresholdSet, Violation, ViolationKind};
use super::types::{
    AuditResult, AuditState, ComponentMetrics, OptimizationCandidate, TargetMetrics,
    NO_METRICS_VIOLATION,
};

/// Starting priority of a failed component.
pub const BASE_PRIORITY: i32 = 5;

/// Executions at which a component counts as frequently used.
pub const HOT_PATH_EXECUTIONS: u64 = 10;

/// Default number of audit results kept in memory.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Compares aggregated metrics with per-layer thresholds and queues failures.
pub struct Auditor {
    analytics: Arc<AnalyticsStore>,
    synchronizer: Option<Arc<Synchronizer>>,
    thresholds: ThresholdSet,
    queue: Arc<OptimizationQueue>,
    history: Mutex<VecDeque<AuditResult>>,
    max_history: usize,
}

impl Auditor {
    pub fn new(
        analytics: Arc<AnalyticsStore>,
        queue: Arc<OptimizationQueue>,
        thresholds: ThresholdSet,
    ) -> Self {
        Self {
            analytics,
            synchronizer: None,
            thresholds,
            queue,
            history: Mutex::new(VecDeque::new()),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Force a sync through `synchronizer` before every audit.
    pub fn with_synchronizer(mut self, synchronizer: Arc<Synchronizer>) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn queue(&self) -> &Arc<OptimizationQueue> {
        &self.queue
    }

    /// Audit one component against its layer's threshold.
    ///
    /// Missing data is reported as a failed result, never as an error.
    #[instrument(level = "debug", skip(self))]
    pub fn audit(&self, component_name: &str, layer: &str) -> Result<AuditResult, AuditError> {
        let threshold = self.thresholds.get(layer);
        self.audit_with_threshold(component_name, layer, &threshold)
    }

    /// Audit one component against an explicit threshold.
    pub fn audit_with_threshold(
        &self,
        component_name: &str,
        layer: &str,
        threshold: &PerformanceThreshold,
    ) -> Result<AuditResult, AuditError> {
        self.force_sync();
        self.evaluate(component_name, layer, threshold)
    }

    /// Audit every component with at least `min_executions` runs.
    ///
    /// Syncs once up front rather than per component.
    pub fn audit_all(&self, min_executions: u64) -> Result<Vec<AuditResult>, AuditError> {
        self.force_sync();
        let summaries = self.analytics.component_summaries(min_executions.max(1))?;

        let mut results = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let threshold = self.thresholds.get(&summary.layer);
            results.push(self.evaluate(&summary.name, &summary.layer, &threshold)?);
        }

        let failed = results.iter().filter(|r| !r.passed).count();
        info!(audited = results.len(), failed, "Audited all components");
        Ok(results)
    }

    /// Current lifecycle state of a component.
    pub fn state(&self, component_name: &str, layer: &str) -> AuditState {
        if self.queue.contains(component_name, layer) {
            return AuditState::Queued;
        }
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        match history
            .iter()
            .rev()
            .find(|r| r.component_name == component_name && r.layer == layer)
        {
            Some(result) if result.passed => AuditState::Passed,
            Some(result) if result.has_data() => AuditState::Failed,
            _ => AuditState::NotAudited,
        }
    }

    /// Recent audit results, oldest first.
    pub fn history(&self) -> Vec<AuditResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn force_sync(&self) {
        if let Some(ref synchronizer) = self.synchronizer {
            if let Err(e) = synchronizer.run() {
                warn!(error = %e, "Pre-audit sync failed; auditing already synced data");
            }
        }
    }

    fn evaluate(
        &self,
        component_name: &str,
        layer: &str,
        threshold: &PerformanceThreshold,
    ) -> Result<AuditResult, AuditError> {
        let rows = self.analytics.aggregate(
            &AggregateFilter::component(layer, component_name),
            GroupBy::None,
        )?;
        let metrics = rows.first().map(ComponentMetrics::from).unwrap_or_default();

        let mut result = AuditResult {
            component_name: component_name.to_string(),
            layer: layer.to_string(),
            passed: false,
            violations: Vec::new(),
            metrics,
            threshold: threshold.clone(),
            priority: None,
            recommendation: None,
            audited_at: Utc::now(),
        };

        if result.metrics.execution_count == 0 {
            result.violations.push(NO_METRICS_VIOLATION.to_string());
            debug!(component = component_name, layer, "No metrics collected");
            self.remember(&result);
            return Ok(result);
        }

        let violations = threshold.evaluate(&result.metrics);
        result.passed = violations.is_empty();
        result.violations = violations.iter().map(Violation::to_string).collect();

        if !result.passed {
            let priority = compute_priority(&result.metrics, &violations);
            let recommendation = recommendation(&violations);
            result.priority = Some(priority);
            result.recommendation = Some(recommendation.clone());

            let snapshot = self.analytics.latest_code_snapshot(layer, component_name)?;
            let now = Utc::now();
            let candidate = OptimizationCandidate {
                component_name: component_name.to_string(),
                layer: layer.to_string(),
                priority,
                violations: result.violations.clone(),
                current_metrics: result.metrics.clone(),
                target_metrics: target_metrics(&result.metrics, threshold),
                recommendation,
                code_hash: snapshot.as_ref().and_then(|(_, hash)| hash.clone()),
                code_snapshot: snapshot.map(|(source, _)| source),
                queued_at: now,
                updated_at: now,
            };
            let inserted = self.queue.upsert(candidate)?;
            info!(
                component = component_name,
                layer,
                priority,
                violations = result.violations.len(),
                inserted,
                "Queued component for optimization"
            );
        } else {
            debug!(component = component_name, layer, "Audit passed");
        }

        self.remember(&result);
        Ok(result)
    }

    fn remember(&self, result: &AuditResult) {
        if self.max_history == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(result.clone());
    }
}

/// Priority of a failed component, clamped to 1..=10.
///
/// Starts at [`BASE_PRIORITY`]; +3 when the error rate exceeds 10%; +2 (or
/// +1) when duration exceeds its limit by more than 2x (or 1.5x), and the
/// same for memory; +1 for more than two violations; +1 when the component
/// has run at least [`HOT_PATH_EXECUTIONS`] times.
pub fn compute_priority(metrics: &ComponentMetrics, violations: &[Violation]) -> u8 {
    let mut priority = BASE_PRIORITY;

    if metrics.error_rate() > 0.10 {
        priority += 3;
    }
    for kind in [ViolationKind::Duration, ViolationKind::Memory] {
        if let Some(violation) = violations.iter().find(|v| v.kind == kind) {
            let ratio = violation.ratio();
            if ratio > 2.0 {
                priority += 2;
            } else if ratio > 1.5 {
                priority += 1;
            }
        }
    }
    if violations.len() > 2 {
        priority += 1;
    }
    if metrics.execution_count >= HOT_PATH_EXECUTIONS {
        priority += 1;
    }

    priority.clamp(1, 10) as u8
}

/// Improvement goals: the threshold where one is set, otherwise a reduction
/// of the current value.
pub fn target_metrics(metrics: &ComponentMetrics, threshold: &PerformanceThreshold) -> TargetMetrics {
    let reduce = |current: f64, factor: f64| (current > 0.0).then(|| current * factor);
    TargetMetrics {
        max_duration_ms: threshold
            .max_duration_ms
            .or_else(|| reduce(metrics.avg_duration_ms, 0.5)),
        max_memory_mb: threshold
            .max_memory_mb
            .or_else(|| reduce(metrics.avg_memory_mb, 0.5)),
        max_cpu_percent: threshold
            .max_cpu_percent
            .or_else(|| reduce(metrics.avg_cpu_percent, 0.3)),
        max_error_rate: threshold
            .max_error_rate
            .or_else(|| reduce(metrics.error_rate(), 0.5)),
        min_success_rate: threshold.min_success_rate,
    }
}

/// Remediation hint naming each violated dimension.
pub fn recommendation(violations: &[Violation]) -> String {
    let mut hints: Vec<&str> = Vec::new();
    let mut push = |hint: &'static str| {
        if !hints.contains(&hint) {
            hints.push(hint);
        }
    };
    for violation in violations {
        match violation.kind {
            ViolationKind::Duration => {
                push("reduce latency: profile the hot path and cache repeated work")
            }
            ViolationKind::Memory => push("reduce memory: stream large inputs instead of buffering"),
            ViolationKind::Cpu => push("reduce CPU: remove redundant computation"),
            ViolationKind::ErrorRate | ViolationKind::SuccessRate => {
                push("improve reliability: handle failing inputs and retry transient errors")
            }
        }
    }
    hints.join("; ")
}
