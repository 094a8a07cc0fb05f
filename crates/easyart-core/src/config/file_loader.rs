//! File-based configuration loading

use super::EasyArtConfig;
use crate::error::{WorkerError, WorkerResult};
use std::fs;
use std::path::Path;

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_config(path: &Path) -> WorkerResult<EasyArtConfig> {
    if !path.exists() {
        return Ok(EasyArtConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        WorkerError::config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            WorkerError::config(format!("Failed to parse TOML config '{}': {}", path.display(), e))
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            WorkerError::config(format!("Failed to parse YAML config '{}': {}", path.display(), e))
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            WorkerError::config(format!("Failed to parse JSON config '{}': {}", path.display(), e))
        })?,
    };

    Ok(config)
}

/// Write configuration as pretty JSON, or TOML for a `.toml` path
pub fn save_config(config: &EasyArtConfig, path: &Path) -> WorkerResult<()> {
    let content = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::to_string_pretty(config)
            .map_err(|e| WorkerError::config(format!("Failed to encode TOML config: {}", e)))?,
        _ => serde_json::to_string_pretty(config)?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}
