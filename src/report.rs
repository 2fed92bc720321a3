// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Markdown performance report over the analytics store.
//!
//! Read-only: the report never syncs, audits or touches the queue file.

use std::collections::HashMap;

use chrono::Utc;

use crate::analytics::{AggregateFilter, AnalyticsStore, ComponentSummary, GroupBy};
use crate::audit::OptimizationQueue;
use crate::error::AnalyticsError;

/// Rows shown in each "top" table.
pub const TOP_N: usize = 10;

/// Build the report for components with at least `min_executions` runs.
pub fn generate_report(
    analytics: &AnalyticsStore,
    queue: &OptimizationQueue,
    min_executions: u64,
) -> Result<String, AnalyticsError> {
    let layers = analytics.layer_summaries()?;
    let components = analytics.component_summaries(min_executions)?;
    let p95 = p95_by_component(analytics)?;

    let mut report = String::new();
    report.push_str("# Performance Report\n\n");
    report.push_str(&format!(
        "Generated: {}  \nRecords: {}  \nMinimum executions: {}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        analytics.count()?,
        min_executions
    ));

    report.push_str("## Layer Summary\n\n");
    if layers.is_empty() {
        report.push_str("_No executions recorded._\n\n");
    } else {
        report.push_str("| Layer | Components | Executions | Avg (ms) | Total (ms) | Error rate |\n");
        report.push_str("|---|---:|---:|---:|---:|---:|\n");
        for layer in &layers {
            report.push_str(&format!(
                "| {} | {} | {} | {:.1} | {:.1} | {:.1}% |\n",
                layer.layer,
                layer.component_count,
                layer.execution_count,
                layer.avg_duration_ms,
                layer.total_duration_ms,
                layer.error_rate() * 100.0
            ));
        }
        report.push('\n');
    }

    report.push_str("## Components\n\n");
    if components.is_empty() {
        report.push_str(&format!(
            "_No components with at least {} executions._\n\n",
            min_executions
        ));
    } else {
        report.push_str(
            "| Layer | Component | Executions | Avg (ms) | P95 (ms) | Max (ms) | Avg mem (MB) | Error rate |\n",
        );
        report.push_str("|---|---|---:|---:|---:|---:|---:|---:|\n");
        for c in &components {
            let p95 = p95
                .get(&(c.layer.clone(), c.name.clone()))
                .copied()
                .unwrap_or(c.max_duration_ms);
            report.push_str(&format!(
                "| {} | {} | {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1}% |\n",
                c.layer,
                c.name,
                c.execution_count,
                c.avg_duration_ms,
                p95,
                c.max_duration_ms,
                c.avg_memory_mb,
                c.error_rate() * 100.0
            ));
        }
        report.push('\n');

        report.push_str("## Top Time Consumers\n\n");
        // component_summaries is already ordered by total time
        for (rank, c) in components.iter().take(TOP_N).enumerate() {
            report.push_str(&format!(
                "{}. `{}:{}`: {:.1}ms total over {} runs\n",
                rank + 1,
                c.layer,
                c.name,
                c.total_duration_ms,
                c.execution_count
            ));
        }
        report.push('\n');

        report.push_str("## Top Memory Consumers\n\n");
        let mut by_memory: Vec<&ComponentSummary> = components.iter().collect();
        by_memory.sort_by(|a, b| b.max_memory_mb.total_cmp(&a.max_memory_mb));
        for (rank, c) in by_memory.iter().take(TOP_N).enumerate() {
            report.push_str(&format!(
                "{}. `{}:{}`: {:.1}MB peak, {:.1}MB avg\n",
                rank + 1,
                c.layer,
                c.name,
                c.max_memory_mb,
                c.avg_memory_mb
            ));
        }
        report.push('\n');

        report.push_str("## Error-Prone Components\n\n");
        let mut failing: Vec<&ComponentSummary> =
            components.iter().filter(|c| c.error_count > 0).collect();
        failing.sort_by(|a, b| b.error_rate().total_cmp(&a.error_rate()));
        if failing.is_empty() {
            report.push_str("_None._\n");
        }
        for c in failing.iter().take(TOP_N) {
            report.push_str(&format!(
                "- `{}:{}`: {:.1}% errors ({} of {})\n",
                c.layer,
                c.name,
                c.error_rate() * 100.0,
                c.error_count,
                c.execution_count
            ));
        }
        report.push('\n');
    }

    report.push_str("## Optimization Queue\n\n");
    let candidates = queue.candidates();
    if candidates.is_empty() {
        report.push_str("_Queue is empty._\n");
    } else {
        report.push_str("| Priority | Layer | Component | Violations | Recommendation |\n");
        report.push_str("|---:|---|---|---|---|\n");
        for candidate in &candidates {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                candidate.priority,
                candidate.layer,
                candidate.component_name,
                candidate.violations.join("; "),
                candidate.recommendation
            ));
        }
    }

    Ok(report)
}

fn p95_by_component(
    analytics: &AnalyticsStore,
) -> Result<HashMap<(String, String), f64>, AnalyticsError> {
    let rows = analytics.aggregate(&AggregateFilter::all(), GroupBy::Component)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| Some(((row.key.layer?, row.key.component?), row.p95_duration_ms)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{ComponentMetrics, OptimizationCandidate, TargetMetrics};
    use crate::record::ExecutionRecord;
    use tempfile::TempDir;

    fn record(layer: &str, name: &str, duration_ms: f64, memory_mb: f64) -> ExecutionRecord {
        ExecutionRecord::new(layer, name)
            .with_id(ExecutionRecord::generate_id())
            .with_duration_ms(duration_ms)
            .with_memory_mb(memory_mb)
    }

    fn seeded() -> AnalyticsStore {
        let analytics = AnalyticsStore::open_in_memory().unwrap();
        let mut records = Vec::new();
        for _ in 0..4 {
            records.push(record("tool", "grep", 40.0, 8.0));
            records.push(record("step", "plan", 900.0, 120.0));
        }
        records.push(record("tool", "fetch", 10.0, 1.0).with_error("timeout"));
        records.push(record("tool", "fetch", 10.0, 1.0));
        analytics.upsert_batch(&records).unwrap();
        analytics
    }

    #[test]
    fn test_report_sections() {
        let temp = TempDir::new().unwrap();
        let queue = OptimizationQueue::open(&temp.path().join("queue.json")).unwrap();
        let report = generate_report(&seeded(), &queue, 1).unwrap();

        for heading in [
            "## Layer Summary",
            "## Components",
            "## Top Time Consumers",
            "## Top Memory Consumers",
            "## Error-Prone Components",
            "## Optimization Queue",
        ] {
            assert!(report.contains(heading), "missing {}", heading);
        }
        assert!(report.contains("Records: 10"));
        assert!(report.contains("1. `step:plan`: 3600.0ms total over 4 runs"));
        assert!(report.contains("1. `step:plan`: 120.0MB peak"));
        assert!(report.contains("- `tool:fetch`: 50.0% errors (1 of 2)"));
        assert!(report.contains("_Queue is empty._"));
    }

    #[test]
    fn test_min_executions_filters_components() {
        let temp = TempDir::new().unwrap();
        let queue = OptimizationQueue::open(&temp.path().join("queue.json")).unwrap();
        let report = generate_report(&seeded(), &queue, 3).unwrap();

        assert!(report.contains("| tool | grep | 4 |"));
        assert!(!report.contains("| tool | fetch |"));
    }

    #[test]
    fn test_empty_store() {
        let temp = TempDir::new().unwrap();
        let queue = OptimizationQueue::open(&temp.path().join("queue.json")).unwrap();
        let analytics = AnalyticsStore::open_in_memory().unwrap();
        let report = generate_report(&analytics, &queue, 1).unwrap();

        assert!(report.contains("_No executions recorded._"));
        assert!(report.contains("_No components with at least 1 executions._"));
    }

    #[test]
    fn test_queue_listed_by_priority() {
        let temp = TempDir::new().unwrap();
        let queue = OptimizationQueue::open(&temp.path().join("queue.json")).unwrap();
        let now = Utc::now();
        for (name, priority) in [("slow", 6u8), ("slower", 9u8)] {
            queue
                .upsert(OptimizationCandidate {
                    component_name: name.to_string(),
                    layer: "tool".to_string(),
                    priority,
                    violations: vec!["avg duration 1200.0ms exceeds max 1000.0ms".to_string()],
                    current_metrics: ComponentMetrics::default(),
                    target_metrics: TargetMetrics::default(),
                    recommendation: "reduce latency".to_string(),
                    code_snapshot: None,
                    code_hash: None,
                    queued_at: now,
                    updated_at: now,
                })
                .unwrap();
        }

        let report = generate_report(&seeded(), &queue, 1).unwrap();
        let slower = report.find("| 9 | tool | slower |").unwrap();
        let slow = report.find("| 6 | tool | slow |").unwrap();
        assert!(slower < slow);
    }
}
