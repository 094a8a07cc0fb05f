//! Client teardown and liveness

use super::{ClientInner, WorkerClient};
use crate::protocol::{RequestParams, methods};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reason given to calls still pending when the client shuts down
const CLIENT_SHUT_DOWN: &str = "worker client shut down";

/// How [`WorkerClient::shutdown_with`] treats the worker's local backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Ask the worker to stop its local backend before killing it
    #[default]
    StopLocalBackend,
    /// Kill the worker without sending `local_sd.shutdown`, e.g. right after
    /// starting or switching the backend, or after stopping it explicitly
    LeaveLocalBackend,
}

impl WorkerClient {
    /// Whether the worker process is still running
    pub async fn is_alive(&self) -> bool {
        self.inner.process.lock().await.is_alive()
    }

    /// Whether the client no longer accepts calls
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.pending.is_closed()
    }

    /// Tear down the worker, stopping its local backend first.
    ///
    /// Same as `shutdown_with(ShutdownMode::StopLocalBackend)`.
    pub async fn shutdown(&self) {
        self.shutdown_with(ShutdownMode::StopLocalBackend).await
    }

    /// Tear down the worker. Safe to call more than once; later calls return
    /// immediately.
    ///
    /// With [`ShutdownMode::StopLocalBackend`] the worker is first asked to
    /// stop its local backend, bounded by `shutdown_grace`. Then the process
    /// is killed if still alive, stdin is released, the background loops are
    /// joined, any call still pending fails with `Terminated`, and diagnostic
    /// sinks are flushed.
    pub async fn shutdown_with(&self, mode: ShutdownMode) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Worker client already shut down");
            return;
        }
        info!(
            "Shutting down worker client (pid {:?}, {:?})",
            self.inner.pid, mode
        );

        let timeouts = &self.inner.timeouts;

        if mode == ShutdownMode::StopLocalBackend
            && !self.inner.pending.is_closed()
            && self.is_alive().await
        {
            let result = self
                .call_with_timeout(
                    methods::LOCAL_SD_SHUTDOWN,
                    RequestParams::empty(),
                    timeouts.shutdown_grace,
                    &CancellationToken::new(),
                )
                .await;
            match result {
                Ok(_) => debug!("Local backend stopped"),
                Err(e) => debug!("Graceful local backend shutdown skipped: {}", e),
            }
        }

        {
            let mut process = self.inner.process.lock().await;
            if process.is_alive() {
                match process.kill() {
                    Ok(true) => match process.wait(timeouts.kill_wait).await {
                        Ok(Some(status)) => debug!("Worker exited: {}", status),
                        Ok(None) => warn!(
                            "Worker still running {:?} after kill",
                            timeouts.kill_wait
                        ),
                        Err(e) => warn!("Failed to wait for worker exit: {}", e),
                    },
                    Ok(false) => {}
                    Err(e) => warn!("Failed to kill worker: {}", e),
                }
            }
        }

        // Ends the writer loop once queued lines are out, closing stdin.
        self.inner.writer.lock().take();

        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for (name, mut handle) in tasks {
            if tokio::time::timeout(timeouts.join_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!(
                    "Worker {} loop did not finish within {:?}; aborting",
                    name, timeouts.join_timeout
                );
                handle.abort();
            }
        }

        let drained = self.inner.pending.close(CLIENT_SHUT_DOWN);
        if drained > 0 {
            debug!("{} pending call(s) terminated by shutdown", drained);
        }

        for sink in self.inner.sinks.iter() {
            sink.flush();
        }

        info!("Worker client shut down");
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // Best effort: never blocks, kill_on_drop covers the child as well.
        if let Err(e) = self.process.get_mut().kill() {
            debug!("Kill on drop failed: {}", e);
        }
        for (_, handle) in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
        self.pending.close(CLIENT_SHUT_DOWN);
    }
}
