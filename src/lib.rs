// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Codi Perf - execution telemetry and performance auditing.
//!
//! Every instrumented call (a function, tool, step, node or workflow) is
//! captured as an [`ExecutionRecord`](record::ExecutionRecord), written durably
//! to an embedded record store, mirrored into an analytics database by a
//! background synchronizer, and audited against per-layer thresholds.
//! Components that fail their audit land in a prioritized optimization queue.
//!
//! # Architecture
//!
//! - [`record`] - Execution record types and bounded payload serialization
//! - [`store`] - Durable write-optimized record store (redb)
//! - [`analytics`] - Query-optimized store, aggregates and summary view (SQLite)
//! - [`sync`] - Record store to analytics store synchronizer
//! - [`instrument`] - Collector, execution scopes and resource sampling
//! - [`audit`] - Thresholds, auditor and the optimization queue
//! - [`report`] - Markdown performance report
//! - [`pipeline`] - Facade owning every stage
//! - [`config`] - Configuration loading and merging
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_perf::config::load_config;
//! use codi_perf::pipeline::Pipeline;
//! use codi_perf::record::layers;
//!
//! let pipeline = Pipeline::open(load_config(Path::new("."))?)?;
//! let files = pipeline
//!     .collector()
//!     .call(layers::TOOL, "list_files", &dir, || list_files(&dir))?;
//!
//! let audit = pipeline.audit("list_files", layers::TOOL)?;
//! println!("{}", pipeline.generate_report(5)?);
//! ```

pub mod analytics;
pub mod audit;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod store;
pub mod sync;

pub use analytics::AnalyticsStore;
pub use audit::{Auditor, OptimizationQueue, PerformanceThreshold};
pub use config::{load_config, PipelineConfig};
pub use error::{
    AnalyticsError, AuditError, ConfigError, PipelineError, QueueError, StorageError, SyncError,
};
pub use instrument::{Collector, ExecutionScope};
pub use pipeline::Pipeline;
pub use record::{ExecutionRecord, ExecutionStatus};
pub use store::RecordStore;
pub use sync::Synchronizer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
