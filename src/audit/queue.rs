// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted optimization queue.
//!
//! The queue is a JSON array of [`OptimizationCandidate`] objects. It is
//! loaded once at open and rewritten wholesale after every mutation while
//! the in-process lock is held, so concurrent mutations cannot lose updates.
//! Mutations apply to a copy that replaces the in-memory entries only once
//! the file has been written.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::QueueError;

use super::types::OptimizationCandidate;

/// Prioritized backlog of components that failed their audit.
///
/// At most one entry per `(component_name, layer)`.
pub struct OptimizationQueue {
    path: PathBuf,
    entries: Mutex<Vec<OptimizationCandidate>>,
}

impl OptimizationQueue {
    /// Load the queue file, starting empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => {
                let mut entries: Vec<OptimizationCandidate> = serde_json::from_str(&content)
                    .map_err(|e| QueueError::Corrupt(format!("{}: {}", path.display(), e)))?;
                sort(&mut entries);
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Loaded optimization queue");
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OptimizationCandidate>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for the candidate's component.
    ///
    /// A replaced entry keeps its original `queued_at`. Returns `true` when
    /// the component was not queued before.
    pub fn upsert(&self, mut candidate: OptimizationCandidate) -> Result<bool, QueueError> {
        let mut entries = self.lock();
        let mut next = entries.clone();
        candidate.updated_at = Utc::now();

        let existing = next
            .iter()
            .position(|c| c.matches(&candidate.component_name, &candidate.layer));
        let inserted = match existing {
            Some(index) => {
                candidate.queued_at = next[index].queued_at;
                next[index] = candidate;
                false
            }
            None => {
                next.push(candidate);
                true
            }
        };
        sort(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(inserted)
    }

    /// Snapshot of every entry, highest priority first.
    pub fn candidates(&self) -> Vec<OptimizationCandidate> {
        self.lock().clone()
    }

    /// Highest-priority entry.
    pub fn peek(&self) -> Option<OptimizationCandidate> {
        self.lock().first().cloned()
    }

    pub fn get(&self, component_name: &str, layer: &str) -> Option<OptimizationCandidate> {
        self.lock()
            .iter()
            .find(|c| c.matches(component_name, layer))
            .cloned()
    }

    pub fn contains(&self, component_name: &str, layer: &str) -> bool {
        self.lock().iter().any(|c| c.matches(component_name, layer))
    }

    /// Remove one component's entry, e.g. once it has been optimized.
    pub fn remove(
        &self,
        component_name: &str,
        layer: &str,
    ) -> Result<Option<OptimizationCandidate>, QueueError> {
        let mut entries = self.lock();
        let Some(index) = entries.iter().position(|c| c.matches(component_name, layer)) else {
            return Ok(None);
        };
        let mut next = entries.clone();
        let removed = next.remove(index);
        self.persist(&next)?;
        *entries = next;
        Ok(Some(removed))
    }

    /// Drop every entry with priority below `min_priority`. Returns how many were dropped.
    pub fn prune_below(&self, min_priority: u8) -> Result<usize, QueueError> {
        let mut entries = self.lock();
        let next: Vec<OptimizationCandidate> = entries
            .iter()
            .filter(|c| c.priority >= min_priority)
            .cloned()
            .collect();
        let dropped = entries.len() - next.len();
        if dropped > 0 {
            self.persist(&next)?;
            *entries = next;
        }
        Ok(dropped)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, QueueError> {
        let mut entries = self.lock();
        self.persist(&[])?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Rewrite the file through a temporary sibling and rename.
    fn persist(&self, entries: &[OptimizationCandidate]) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| QueueError::SaveFailed(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(entries = entries.len(), "Saved optimization queue");
        Ok(())
    }
}

/// Priority descending, then oldest first, then by name.
fn sort(entries: &mut [OptimizationCandidate]) {
    entries.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.queued_at.cmp(&b.queued_at))
            .then_with(|| a.component_name.cmp(&b.component_name))
            .then_with(|| a.layer.cmp(&b.layer))
    });
}
