//! Worker stderr forwarding configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Emit each worker stderr line through `tracing`
    #[serde(default = "default_true")]
    pub forward_to_tracing: bool,
    /// Also append worker stderr lines to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Buffer size of the subscriber broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            forward_to_tracing: true,
            log_file: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn merge(&mut self, other: DiagnosticsConfig) {
        self.forward_to_tracing = other.forward_to_tracing;
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
        if other.channel_capacity > 0 {
            self.channel_capacity = other.channel_capacity;
        }
    }
}
