// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process resource sampling via sysinfo.
//!
//! Every figure is best-effort. A counter the platform cannot provide reads
//! as zero instead of failing the measurement.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// System memory utilisation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressure {
    /// Bucket a utilisation percentage (0-100).
    pub fn from_utilisation(percent: f64) -> Self {
        if percent >= 90.0 {
            Self::Critical
        } else if percent >= 75.0 {
            Self::High
        } else if percent >= 50.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Point-in-time process counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSnapshot {
    pub rss_bytes: u64,
    pub cpu_percent: f64,
    /// Cumulative bytes read by the process.
    pub io_read_bytes: u64,
    /// Cumulative bytes written by the process.
    pub io_write_bytes: u64,
    pub thread_count: usize,
    /// System-wide memory utilisation (0-100).
    pub system_memory_percent: f64,
}

/// Resource cost of one execution, derived from two snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// RSS growth over the call, never negative.
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub rss_mb: f64,
    pub peak_memory_mb: f64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub thread_count: usize,
    pub memory_pressure: MemoryPressure,
}

impl ResourceUsage {
    /// Compare a baseline snapshot with an end snapshot.
    pub fn between(start: &ResourceSnapshot, end: &ResourceSnapshot) -> Self {
        Self {
            memory_mb: end.rss_bytes.saturating_sub(start.rss_bytes) as f64 / BYTES_PER_MB,
            cpu_percent: end.cpu_percent.max(0.0),
            rss_mb: end.rss_bytes as f64 / BYTES_PER_MB,
            peak_memory_mb: start.rss_bytes.max(end.rss_bytes) as f64 / BYTES_PER_MB,
            io_read_bytes: end.io_read_bytes.saturating_sub(start.io_read_bytes),
            io_write_bytes: end.io_write_bytes.saturating_sub(start.io_write_bytes),
            thread_count: end.thread_count,
            memory_pressure: MemoryPressure::from_utilisation(end.system_memory_percent),
        }
    }
}

/// Samples the current process.
///
/// A disabled sampler returns zeroed snapshots without touching the OS.
pub struct ResourceSampler {
    state: Option<(Pid, Mutex<System>)>,
}

impl ResourceSampler {
    /// Sample the current process. Falls back to disabled when the process
    /// id cannot be determined.
    pub fn new() -> Self {
        let state = sysinfo::get_current_pid()
            .ok()
            .map(|pid| (pid, Mutex::new(System::new())));
        Self { state }
    }

    /// A sampler that always reports zeros.
    pub fn disabled() -> Self {
        Self { state: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Take a snapshot of the current process.
    pub fn sample(&self) -> ResourceSnapshot {
        let Some((pid, system)) = &self.state else {
            return ResourceSnapshot::default();
        };

        let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[*pid]),
            false,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_disk_usage()
                .with_tasks(),
        );
        system.refresh_memory();

        let total_memory = system.total_memory();
        let system_memory_percent = if total_memory == 0 {
            0.0
        } else {
            system.used_memory() as f64 / total_memory as f64 * 100.0
        };

        match system.process(*pid) {
            Some(process) => {
                let disk = process.disk_usage();
                ResourceSnapshot {
                    rss_bytes: process.memory(),
                    cpu_percent: f64::from(process.cpu_usage()),
                    io_read_bytes: disk.total_read_bytes,
                    io_write_bytes: disk.total_written_bytes,
                    thread_count: process.tasks().map(|tasks| tasks.len()).unwrap_or(1),
                    system_memory_percent,
                }
            }
            None => ResourceSnapshot {
                system_memory_percent,
                ..Default::default()
            },
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pressure_buckets() {
        assert_eq!(MemoryPressure::from_utilisation(10.0), MemoryPressure::Low);
        assert_eq!(MemoryPressure::from_utilisation(50.0), MemoryPressure::Medium);
        assert_eq!(MemoryPressure::from_utilisation(75.0), MemoryPressure::High);
        assert_eq!(MemoryPressure::from_utilisation(95.0), MemoryPressure::Critical);
        assert_eq!(MemoryPressure::Critical.as_str(), "critical");
    }

    #[test]
    fn test_usage_deltas_never_negative() {
        let start = ResourceSnapshot {
            rss_bytes: 200 * 1024 * 1024,
            io_read_bytes: 500,
            io_write_bytes: 100,
            ..Default::default()
        };
        let end = ResourceSnapshot {
            rss_bytes: 100 * 1024 * 1024,
            io_read_bytes: 800,
            io_write_bytes: 50,
            cpu_percent: 12.5,
            thread_count: 4,
            system_memory_percent: 60.0,
        };

        let usage = ResourceUsage::between(&start, &end);
        assert_eq!(usage.memory_mb, 0.0);
        assert_eq!(usage.peak_memory_mb, 200.0);
        assert_eq!(usage.rss_mb, 100.0);
        assert_eq!(usage.io_read_bytes, 300);
        assert_eq!(usage.io_write_bytes, 0);
        assert_eq!(usage.cpu_percent, 12.5);
        assert_eq!(usage.memory_pressure, MemoryPressure::Medium);
    }

    #[test]
    fn test_disabled_sampler_reports_zero() {
        let sampler = ResourceSampler::disabled();
        assert!(!sampler.is_enabled());
        assert_eq!(sampler.sample(), ResourceSnapshot::default());
    }

    #[test]
    fn test_enabled_sampler_reads_current_process() {
        let sampler = ResourceSampler::new();
        if sampler.is_enabled() {
            let snapshot = sampler.sample();
            assert!(snapshot.rss_bytes > 0);
            assert!(snapshot.thread_count >= 1);
        }
    }
}
