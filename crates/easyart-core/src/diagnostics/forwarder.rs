//! Background loop draining the worker's stderr

use super::{DiagnosticLine, DiagnosticSink};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

/// Read `stderr` until end-of-stream, forwarding each non-empty line.
pub async fn run_diagnostics_loop<R>(
    stderr: R,
    sinks: Arc<Vec<Arc<dyn DiagnosticSink>>>,
    subscribers: broadcast::Sender<DiagnosticLine>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut forwarded = 0usize;

    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                debug!("Error reading worker stderr: {}", e);
                break;
            }
        };
        if n == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            continue;
        }

        let line = DiagnosticLine::new(text);
        for sink in sinks.iter() {
            sink.forward(&line);
        }
        // No subscribers is not an error
        let _ = subscribers.send(line);
        forwarded += 1;
    }

    for sink in sinks.iter() {
        sink.flush();
    }
    debug!("Worker stderr closed after {} line(s)", forwarded);
}
