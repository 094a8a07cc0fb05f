//! Request writer
//!
//! Owns the worker's stdin. Callers hand over complete lines through a
//! channel, so a line is always written whole even if the caller that
//! queued it is dropped or cancelled mid-write.

use super::WorkerStdin;
use crate::error::{WorkerError, WorkerResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Capacity of the queue between callers and the writer task
pub(super) const WRITE_QUEUE_CAPACITY: usize = 64;

/// Reason given when a line cannot be handed to the writer
pub(super) const INPUT_CLOSED: &str = "worker input stream closed";

/// One encoded request plus the channel that reports whether it was written
pub(super) struct WriteRequest {
    pub line: String,
    pub written: oneshot::Sender<WorkerResult<()>>,
}

/// Write queued lines to the worker until every sender is gone or a write fails
pub(super) async fn run_writer_loop(
    mut stdin: WorkerStdin,
    mut queue: mpsc::Receiver<WriteRequest>,
) {
    while let Some(request) = queue.recv().await {
        let result = write_line(&mut stdin, &request.line).await;
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!("Failed to write to worker: {}", e);
        }
        // The caller may have given up already; the line still went out whole.
        let _ = request.written.send(result);
        if failed {
            break;
        }
    }
    debug!("Worker input released");
}

async fn write_line(stdin: &mut WorkerStdin, line: &str) -> WorkerResult<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Queue `line` on `queue` and wait until the writer reports on it
pub(super) async fn submit(queue: mpsc::Sender<WriteRequest>, line: String) -> WorkerResult<()> {
    let (written, report) = oneshot::channel();
    queue
        .send(WriteRequest { line, written })
        .await
        .map_err(|_| WorkerError::terminated(INPUT_CLOSED))?;
    report
        .await
        .map_err(|_| WorkerError::terminated(INPUT_CLOSED))?
}
