//! Top-level configuration model

use super::{DiagnosticsConfig, LoggingConfig, TimeoutConfig, WorkerLaunchConfig};
use serde::{Deserialize, Serialize};

/// Complete configuration for a worker client and its host application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EasyArtConfig {
    pub worker: WorkerLaunchConfig,
    pub logging: LoggingConfig,
    pub timeouts: TimeoutConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl EasyArtConfig {
    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: EasyArtConfig) {
        self.worker.merge(other.worker);
        self.logging.merge(other.logging);
        self.timeouts.merge(other.timeouts);
        self.diagnostics.merge(other.diagnostics);
    }
}
