// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Performance audits and the optimization queue.
//!
//! An audit forces a sync, aggregates a component's metrics, compares them
//! with its layer threshold, and queues failures by priority.
//!
//! ```text
//! NotAudited ──(no data)──▶ NotAudited
//!     │
//!     ├──▶ Passed
//!     └──▶ Failed ──▶ Queued
//! ```
//!
//! Nothing leaves `Queued` automatically; entries are removed by whoever
//! performs the optimization.

pub mod auditor;
pub mod queue;
pub mod thresholds;
pub mod types;

pub use auditor::{compute_priority, recommendation, target_metrics, Auditor, BASE_PRIORITY};
pub use queue::OptimizationQueue;
pub use thresholds::{PerformanceThreshold, ThresholdSet, Violation, ViolationKind};
pub use types::{
    AuditResult, AuditState, ComponentMetrics, OptimizationCandidate, TargetMetrics,
    NO_METRICS_VIOLATION,
};
