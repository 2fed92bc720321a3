// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in the workspace
//! and the global config directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ConfigError;

use super::types::PipelineConfigFile;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[".codi-perf.json", ".codi-perf.yaml", ".codi-perf/config.json"];

/// Global config directory, relative to the home directory.
pub const GLOBAL_CONFIG_DIR: &str = ".codi/perf";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Default data directory for a project: `~/.codi/perf/<name>-<hash>`.
pub fn default_data_dir(project_root: &Path) -> PathBuf {
    let root = project_root.to_string_lossy();
    let mut hasher = Sha256::new();
    hasher.update(root.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let hash_short = &hash[..8];

    let project_name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    get_global_config_dir()
        .unwrap_or_else(|| PathBuf::from(".codi-perf"))
        .join(format!("{}-{}", project_name, hash_short))
}

/// Load global configuration from ~/.codi/perf/config.json.
pub fn load_global_config() -> Result<Option<PipelineConfigFile>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// Searches for config files in the following order:
/// 1. .codi-perf.json
/// 2. .codi-perf.yaml
/// 3. .codi-perf/config.json
pub fn load_workspace_config(
    workspace_root: &Path,
) -> Result<Option<PipelineConfigFile>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<PipelineConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Save workspace configuration to a file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &PipelineConfigFile,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let filename = filename.unwrap_or(CONFIG_FILES[0]);
    let path = workspace_root.join(filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if CONFIG_FILES.iter().any(|f| current.join(f).exists()) {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}
