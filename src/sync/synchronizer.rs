// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batch migration from the record store to the analytics store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::analytics::AnalyticsStore;
use crate::error::SyncError;
use crate::record::ExecutionRecord;
use crate::store::RecordStore;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Outcome of one synchronization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Batches upserted.
    pub batches: usize,
    /// Records whose pending markers were cleared.
    pub synced: usize,
    /// Records newly inserted into the analytics store. Lower than `synced`
    /// when a batch is replayed after a crash.
    pub inserted: usize,
    /// The run stopped early on a stop request or deadline.
    pub interrupted: bool,
}

/// Moves records from "written" to "queryable" in pending order.
///
/// At most one run is active at a time; a concurrent caller waits for the
/// lock and then finds nothing left to do.
pub struct Synchronizer {
    records: Arc<RecordStore>,
    analytics: Arc<AnalyticsStore>,
    batch_size: usize,
    lock: Mutex<()>,
    stop: AtomicBool,
}

impl Synchronizer {
    /// Create a synchronizer over a store pair.
    pub fn new(records: Arc<RecordStore>, analytics: Arc<AnalyticsStore>) -> Self {
        Self {
            records,
            analytics,
            batch_size: DEFAULT_BATCH_SIZE,
            lock: Mutex::new(()),
            stop: AtomicBool::new(false),
        }
    }

    /// Set the batch size (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain every pending marker into the analytics store.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        self.run_until(None)
    }

    /// Drain pending markers until none remain, a stop is requested, or the
    /// deadline passes.
    ///
    /// Markers are cleared only after their batch has been upserted, so a
    /// failed batch stays pending and is retried by the next run.
    #[instrument(level = "debug", skip(self))]
    pub fn run_until(&self, deadline: Option<Instant>) -> Result<SyncReport, SyncError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        let mut report = SyncReport::default();

        loop {
            if self.stop.load(Ordering::SeqCst) || deadline.is_some_and(|d| Instant::now() >= d) {
                report.interrupted = true;
                break;
            }

            let pending = self.records.drain_pending(self.batch_size)?;
            if pending.is_empty() {
                break;
            }

            let ids: Vec<String> = pending.iter().map(|p| p.id().to_string()).collect();
            let batch: Vec<ExecutionRecord> = pending.into_iter().map(|p| p.record).collect();

            let inserted =
                self.analytics
                    .upsert_batch(&batch)
                    .map_err(|source| SyncError::Upsert {
                        batch_size: batch.len(),
                        source,
                    })?;
            let cleared = self.records.clear_pending(&ids)?;

            report.batches += 1;
            report.inserted += inserted;
            report.synced += cleared;

            if cleared == 0 {
                // Markers vanished underneath us; nothing more to make progress on.
                break;
            }
        }

        if report.synced > 0 {
            debug!(
                synced = report.synced,
                inserted = report.inserted,
                batches = report.batches,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Synchronized pending records"
            );
        }
        Ok(report)
    }

    /// Ask an in-flight run to stop after its current batch.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Final drain-to-zero before shutdown, bounded by `grace`.
    ///
    /// Clears any earlier stop request so the sweep itself can run.
    pub fn final_sweep(&self, grace: Duration) -> Result<SyncReport, SyncError> {
        self.stop.store(false, Ordering::SeqCst);
        let report = self.run_until(Some(Instant::now() + grace))?;
        if report.interrupted {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Final sync sweep hit its grace period; remaining records stay pending"
            );
        } else {
            info!(synced = report.synced, "Final sync sweep complete");
        }
        Ok(report)
    }

    /// Start the periodic background loop on the current tokio runtime.
    ///
    /// Each tick runs a sync on the blocking pool; failures are logged and
    /// retried on the next tick. [`SyncHandle::shutdown`] stops the loop and
    /// waits for a final sweep.
    pub fn spawn(self: &Arc<Self>, every: Duration, grace: Duration) -> Result<SyncHandle, SyncError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SyncError::Task(
                "background sync requires a tokio runtime".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sync = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let tick_sync = Arc::clone(&sync);
                        match tokio::task::spawn_blocking(move || tick_sync.run()).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => warn!(error = %e, "Background sync failed; retrying next tick"),
                            Err(e) => warn!(error = %e, "Background sync task aborted"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            let sweep_sync = Arc::clone(&sync);
            tokio::task::spawn_blocking(move || sweep_sync.final_sweep(grace))
                .await
                .map_err(|e| SyncError::Task(e.to_string()))?
        });

        debug!(interval_ms = every.as_millis() as u64, "Started background sync");
        Ok(SyncHandle {
            shutdown_tx,
            task,
            synchronizer: Arc::clone(self),
        })
    }
}

/// Handle to the background sync loop.
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<SyncReport, SyncError>>,
    synchronizer: Arc<Synchronizer>,
}

impl SyncHandle {
    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait until it has run its final sweep.
    pub async fn shutdown(self) -> Result<SyncReport, SyncError> {
        self.synchronizer.request_stop();
        // The receiver may already be gone if the task ended; the join below reports that.
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// Stop the loop from a thread outside the runtime, waiting up to `wait`
    /// for the task to exit. Returns whether it exited.
    ///
    /// A run already on the blocking pool keeps the run lock until it
    /// finishes, so a later [`Synchronizer::final_sweep`] waits for it.
    /// Calling this on the thread that drives a current-thread runtime
    /// always times out.
    pub fn abort_blocking(self, wait: Duration) -> bool {
        self.synchronizer.request_stop();
        let _ = self.shutdown_tx.send(true);
        self.task.abort();

        let deadline = Instant::now() + wait;
        while !self.task.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}
