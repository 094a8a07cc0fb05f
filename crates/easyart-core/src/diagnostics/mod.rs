//! Worker stderr forwarding
//!
//! A background loop reads the worker's error stream line by line and hands
//! each line to every registered [`DiagnosticSink`] and to a broadcast
//! channel that any number of subscribers can listen on. Nothing in this
//! path returns an error to callers.

mod forwarder;
mod sink;

pub use forwarder::run_diagnostics_loop;
pub use sink::{DiagnosticSink, FileSink, TracingSink};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tracing target used for forwarded worker output
pub const WORKER_LOG_TARGET: &str = "easyart::worker";

/// One line read from the worker's stderr
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticLine {
    pub line: String,
    pub received_at: DateTime<Utc>,
}

impl DiagnosticLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            received_at: Utc::now(),
        }
    }
}
