//! Diagnostic sink trait and implementations

use super::{DiagnosticLine, WORKER_LOG_TARGET};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Receives forwarded worker stderr lines.
///
/// Implementations must not panic and must swallow their own failures.
pub trait DiagnosticSink: Send + Sync {
    fn forward(&self, line: &DiagnosticLine);

    /// Flush buffered output; called during client teardown
    fn flush(&self) {}
}

/// Emits worker lines through `tracing` under the `easyart::worker` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn forward(&self, line: &DiagnosticLine) {
        warn!(target: WORKER_LOG_TARGET, "{}", line.line);
    }
}

/// Appends worker lines to a file, one per line
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticSink for FileSink {
    fn forward(&self, line: &DiagnosticLine) {
        let mut writer = self.writer.lock();
        let _ = writeln!(
            writer,
            "{} {}",
            line.received_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            line.line
        );
    }

    fn flush(&self) {
        let _ = self.writer.lock().flush();
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink").field("path", &self.path).finish()
    }
}
