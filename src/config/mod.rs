// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for the telemetry pipeline.
//!
//! Handles loading and merging of configuration from multiple sources:
//! - Global config: ~/.codi/perf/config.json
//! - Workspace config: .codi-perf.json, .codi-perf.yaml, or .codi-perf/config.json
//! - Environment: CODI_PERF_DATA_DIR, CODI_PERF_SYNC_INTERVAL_MS, CODI_PERF_BATCH_SIZE
//!
//! Configuration is merged with precedence (env > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    default_data_dir, find_workspace_root, get_global_config_dir, get_global_config_path,
    load_config_file, load_global_config, load_workspace_config, save_workspace_config,
    CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
};

pub use merger::{merge_config, EnvOverrides, ENV_BATCH_SIZE, ENV_DATA_DIR, ENV_SYNC_INTERVAL_MS};

pub use types::{
    PipelineConfig, PipelineConfigFile, ANALYTICS_FILE, DEFAULT_MAX_AUDIT_HISTORY,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_SYNC_BATCH_SIZE, DEFAULT_SYNC_INTERVAL_MS, QUEUE_FILE,
    RECORDS_FILE,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge, and validate all configuration sources for a workspace.
///
/// This is the main entry point for configuration loading.
pub fn load_config(workspace_root: &Path) -> Result<PipelineConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let env = EnvOverrides::from_env()?;

    let config = merge_config(workspace_root, global, workspace, env);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_workspace_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".codi-perf.json"),
            r#"{"dataDir": "data", "maxAuditHistory": 7}"#,
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.max_audit_history, 7);
        if std::env::var(ENV_DATA_DIR).is_err() {
            assert_eq!(config.data_dir, temp.path().join("data"));
        }
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".codi-perf.json"), r#"{"syncIntervalMs": 0}"#).unwrap();

        if std::env::var(ENV_SYNC_INTERVAL_MS).is_err() {
            assert!(matches!(
                load_config(temp.path()),
                Err(ConfigError::InvalidValue { .. })
            ));
        }
    }
}
