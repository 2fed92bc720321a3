// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::loader::default_data_dir;
use super::types::{PipelineConfig, PipelineConfigFile};

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "CODI_PERF_DATA_DIR";
/// Environment variable overriding the sync interval in milliseconds.
pub const ENV_SYNC_INTERVAL_MS: &str = "CODI_PERF_SYNC_INTERVAL_MS";
/// Environment variable overriding the sync batch size.
pub const ENV_BATCH_SIZE: &str = "CODI_PERF_BATCH_SIZE";

/// Overrides read from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub data_dir: Option<PathBuf>,
    pub sync_interval_ms: Option<u64>,
    pub sync_batch_size: Option<usize>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: lookup(ENV_DATA_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            sync_interval_ms: parse_var(&lookup, ENV_SYNC_INTERVAL_MS)?,
            sync_batch_size: parse_var(&lookup, ENV_BATCH_SIZE)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    field: key.to_string(),
                    message: format!("'{}' is not a valid number", raw),
                })
        }
        _ => Ok(None),
    }
}

/// Merge configuration sources with precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables
/// 2. Workspace config (.codi-perf.json)
/// 3. Global config (~/.codi/perf/config.json)
/// 4. Default values
pub fn merge_config(
    project_root: &Path,
    global: Option<PipelineConfigFile>,
    workspace: Option<PipelineConfigFile>,
    env: EnvOverrides,
) -> PipelineConfig {
    let mut result = PipelineConfig::new(default_data_dir(project_root));

    if let Some(ref global) = global {
        apply_config_file(&mut result, global, project_root);
    }
    if let Some(ref workspace) = workspace {
        apply_config_file(&mut result, workspace, project_root);
    }
    apply_env(&mut result, env);

    result
}

fn apply_config_file(result: &mut PipelineConfig, config: &PipelineConfigFile, base: &Path) {
    if let Some(ref dir) = config.data_dir {
        result.data_dir = if dir.is_absolute() {
            dir.clone()
        } else {
            base.join(dir)
        };
    }
    if let Some(ms) = config.sync_interval_ms {
        result.sync_interval_ms = ms;
    }
    if let Some(size) = config.sync_batch_size {
        result.sync_batch_size = size;
    }
    if let Some(ms) = config.shutdown_grace_ms {
        result.shutdown_grace_ms = ms;
    }
    if let Some(enabled) = config.capture_system_metrics {
        result.capture_system_metrics = enabled;
    }
    if let Some(max) = config.max_audit_history {
        result.max_audit_history = max;
    }
    if let Some(ref thresholds) = config.thresholds {
        for (layer, threshold) in thresholds {
            let merged = match result.thresholds.get(layer) {
                Some(existing) => existing.merged_with(threshold),
                None => threshold.clone(),
            };
            result.thresholds.insert(layer.clone(), merged);
        }
    }
}

fn apply_env(result: &mut PipelineConfig, env: EnvOverrides) {
    if let Some(dir) = env.data_dir {
        result.data_dir = dir;
    }
    if let Some(ms) = env.sync_interval_ms {
        result.sync_interval_ms = ms;
    }
    if let Some(size) = env.sync_batch_size {
        result.sync_batch_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::PerformanceThreshold;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_only() {
        let config = merge_config(Path::new("/work/app"), None, None, EnvOverrides::default());
        assert_eq!(config.sync_interval_ms, 5000);
        assert!(config
            .data_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("app-"));
    }

    #[test]
    fn test_workspace_overrides_global() {
        let global = PipelineConfigFile {
            sync_interval_ms: Some(1000),
            sync_batch_size: Some(10),
            ..Default::default()
        };
        let workspace = PipelineConfigFile {
            sync_interval_ms: Some(2000),
            data_dir: Some(PathBuf::from("perf-data")),
            ..Default::default()
        };

        let config = merge_config(
            Path::new("/work/app"),
            Some(global),
            Some(workspace),
            EnvOverrides::default(),
        );
        assert_eq!(config.sync_interval_ms, 2000);
        assert_eq!(config.sync_batch_size, 10);
        assert_eq!(config.data_dir, PathBuf::from("/work/app/perf-data"));
    }

    #[test]
    fn test_threshold_layers_merge_across_files() {
        let mut global_thresholds = HashMap::new();
        global_thresholds.insert(
            "tool".to_string(),
            PerformanceThreshold::unbounded().with_max_memory_mb(64.0),
        );
        let mut workspace_thresholds = HashMap::new();
        workspace_thresholds.insert(
            "tool".to_string(),
            PerformanceThreshold::unbounded().with_max_duration_ms(300.0),
        );

        let config = merge_config(
            Path::new("/work/app"),
            Some(PipelineConfigFile {
                thresholds: Some(global_thresholds),
                ..Default::default()
            }),
            Some(PipelineConfigFile {
                thresholds: Some(workspace_thresholds),
                ..Default::default()
            }),
            EnvOverrides::default(),
        );
        let tool = &config.thresholds["tool"];
        assert_eq!(tool.max_memory_mb, Some(64.0));
        assert_eq!(tool.max_duration_ms, Some(300.0));
    }

    #[test]
    fn test_env_wins() {
        let env = EnvOverrides::from_lookup(|key| match key {
            ENV_DATA_DIR => Some("/var/perf".to_string()),
            ENV_BATCH_SIZE => Some(" 25 ".to_string()),
            _ => None,
        })
        .unwrap();

        let workspace = PipelineConfigFile {
            sync_batch_size: Some(100),
            ..Default::default()
        };
        let config = merge_config(Path::new("/work/app"), None, Some(workspace), env);
        assert_eq!(config.data_dir, PathBuf::from("/var/perf"));
        assert_eq!(config.sync_batch_size, 25);
    }

    #[test]
    fn test_env_invalid_number() {
        let result = EnvOverrides::from_lookup(|key| {
            (key == ENV_SYNC_INTERVAL_MS).then(|| "soon".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == ENV_SYNC_INTERVAL_MS
        ));
    }
}
