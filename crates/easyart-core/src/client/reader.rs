//! Background response reader for the worker client

use crate::correlation::{Completion, PendingTable};
use crate::protocol::WorkerResponse;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, warn};

/// Reason given to callers still waiting when the worker's output ends
pub(super) const OUTPUT_CLOSED: &str = "worker closed its output stream";

/// Drains the table when the loop ends, however it ends
struct DrainOnExit {
    pending: Arc<PendingTable>,
    reason: &'static str,
}

impl Drop for DrainOnExit {
    fn drop(&mut self) {
        let drained = self.pending.close(self.reason);
        if drained > 0 {
            warn!("{} pending call(s) terminated: {}", drained, self.reason);
        }
    }
}

/// Read worker stdout line by line and route each response to its waiter.
///
/// Lines that are not valid responses are logged and skipped. On EOF or a
/// read error every pending waiter is resolved with `Terminated` and the
/// table refuses further registrations.
pub(super) async fn run_response_loop<R>(stdout: R, pending: Arc<PendingTable>)
where
    R: AsyncRead + Unpin,
{
    let _drain = DrainOnExit {
        pending: Arc::clone(&pending),
        reason: OUTPUT_CLOSED,
    };

    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Worker stdout reached EOF");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                dispatch_line(line, &pending);
            }
            Err(e) => {
                error!("Error reading worker stdout: {}", e);
                break;
            }
        }
    }
}

fn dispatch_line(line: &str, pending: &PendingTable) {
    match WorkerResponse::parse_line(line) {
        Ok(response) => {
            let id = response.id;
            if !pending.resolve(id.as_str(), Completion::from(response.body)) {
                // Cancelled, already answered, or never ours.
                debug!("Discarding response for unknown request: {}", id);
            }
        }
        Err(e) => warn!("Ignoring unparseable worker output ({}): {}", e, truncate(line)),
    }
}

fn truncate(line: &str) -> &str {
    const MAX: usize = 200;
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
