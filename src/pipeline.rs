// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline facade.
//!
//! [`Pipeline`] owns every stage: the record store, the analytics store, the
//! synchronizer and its background task, the collector and the auditor.
//! It is constructed explicitly and passed to whoever instruments code;
//! there is no process-wide tracker.
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_perf::config::PipelineConfig;
//! use codi_perf::pipeline::Pipeline;
//! use codi_perf::record::layers;
//!
//! let mut pipeline = Pipeline::open(PipelineConfig::new("/tmp/perf"))?;
//! pipeline.start_background_sync()?;
//!
//! let hits = pipeline
//!     .collector()
//!     .call(layers::TOOL, "grep", &query, || grep(&query))?;
//!
//! let result = pipeline.audit("grep", layers::TOOL)?;
//! pipeline.close().await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::analytics::AnalyticsStore;
use crate::audit::{AuditResult, Auditor, OptimizationQueue};
use crate::config::PipelineConfig;
use crate::error::{AuditError, PipelineError};
use crate::instrument::{Collector, ResourceSampler};
use crate::report;
use crate::store::RecordStore;
use crate::sync::{SyncHandle, SyncReport, Synchronizer};

/// Owner of the whole telemetry pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    records: Arc<RecordStore>,
    analytics: Arc<AnalyticsStore>,
    synchronizer: Arc<Synchronizer>,
    queue: Arc<OptimizationQueue>,
    auditor: Auditor,
    collector: Collector,
    background: Mutex<Option<SyncHandle>>,
}

impl Pipeline {
    /// Open (or create) every store under the configured data directory.
    pub fn open(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        std::fs::create_dir_all(config.data_dir()).map_err(crate::error::StorageError::from)?;

        let records = Arc::new(RecordStore::open(&config.records_path())?);
        let analytics = Arc::new(AnalyticsStore::open(&config.analytics_path())?);
        let synchronizer = Arc::new(
            Synchronizer::new(Arc::clone(&records), Arc::clone(&analytics))
                .with_batch_size(config.sync_batch_size),
        );
        let queue = Arc::new(OptimizationQueue::open(&config.queue_path())?);
        let auditor = Auditor::new(
            Arc::clone(&analytics),
            Arc::clone(&queue),
            config.threshold_set(),
        )
        .with_synchronizer(Arc::clone(&synchronizer))
        .with_max_history(config.max_audit_history);

        let sampler = if config.capture_system_metrics {
            ResourceSampler::new()
        } else {
            ResourceSampler::disabled()
        };
        let collector = Collector::new(records.clone()).with_sampler(sampler);

        info!(data_dir = %config.data_dir().display(), "Opened telemetry pipeline");

        Ok(Self {
            config,
            records,
            analytics,
            synchronizer,
            queue,
            auditor,
            collector,
            background: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Collector writing into this pipeline's record store.
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn analytics(&self) -> &Arc<AnalyticsStore> {
        &self.analytics
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub fn queue(&self) -> &Arc<OptimizationQueue> {
        &self.queue
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    /// Drain every pending record into the analytics store now.
    pub fn sync_now(&self) -> Result<SyncReport, PipelineError> {
        Ok(self.synchronizer.run()?)
    }

    /// Audit one component. Forces a sync first.
    pub fn audit(&self, component_name: &str, layer: &str) -> Result<AuditResult, AuditError> {
        self.auditor.audit(component_name, layer)
    }

    /// Audit every component with at least `min_executions` runs.
    pub fn audit_all(&self, min_executions: u64) -> Result<Vec<AuditResult>, AuditError> {
        self.auditor.audit_all(min_executions)
    }

    /// Sync, then render the markdown report.
    pub fn generate_report(&self, min_executions: u64) -> Result<String, PipelineError> {
        if let Err(e) = self.synchronizer.run() {
            warn!(error = %e, "Sync before report failed; reporting synced data only");
        }
        Ok(report::generate_report(
            &self.analytics,
            &self.queue,
            min_executions,
        )?)
    }

    /// Start the periodic sync loop. Requires a tokio runtime.
    pub fn start_background_sync(&self) -> Result<(), PipelineError> {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        if background.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        let handle = self
            .synchronizer
            .spawn(self.config.sync_interval(), self.config.shutdown_grace())?;
        *background = Some(handle);
        Ok(())
    }

    /// Whether the background sync loop is running.
    pub fn is_background_sync_running(&self) -> bool {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background loop (waiting for its final sweep), then close
    /// both stores.
    ///
    /// Without a background loop a final sweep runs inline.
    pub async fn close(self) -> Result<SyncReport, PipelineError> {
        let handle = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let report = match handle {
            Some(handle) => handle.shutdown().await?,
            None => {
                let sync = Arc::clone(&self.synchronizer);
                let grace = self.config.shutdown_grace();
                tokio::task::spawn_blocking(move || sync.final_sweep(grace))
                    .await
                    .map_err(|e| crate::error::SyncError::Task(e.to_string()))??
            }
        };
        self.close_stores()?;
        Ok(report)
    }

    /// Close from synchronous code: final sweep on this thread, then close.
    ///
    /// A background loop, if any, is aborted and waited for (up to the
    /// shutdown grace) before the sweep. Call from outside the runtime; in
    /// async code use [`close`](Self::close).
    pub fn close_blocking(self) -> Result<SyncReport, PipelineError> {
        let handle = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if !handle.abort_blocking(self.config.shutdown_grace()) {
                warn!("Background sync task still running at close");
            }
        }
        let report = self.synchronizer.final_sweep(self.config.shutdown_grace())?;
        self.close_stores()?;
        Ok(report)
    }

    fn close_stores(&self) -> Result<(), PipelineError> {
        self.records.close()?;
        self.analytics.close()?;
        info!("Closed telemetry pipeline");
        Ok(())
    }
}
