//! Worker client
//!
//! Owns the worker process and multiplexes concurrent calls over its single
//! stdin/stdout pair.
//!
//! # Features
//! - Any number of concurrent callers; a single writer task owns stdin, so
//!   lines never interleave
//! - Responses routed by id, in any order
//! - Cooperative per-call cancellation via `CancellationToken`
//! - Pending calls fail with `Terminated` as soon as the worker goes away
//! - Worker stderr forwarded to diagnostic sinks and subscribers

mod lifecycle;
mod operations;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use lifecycle::ShutdownMode;
pub use operations::Ack;

use crate::config::{EasyArtConfig, TimeoutConfig, WorkerLaunchConfig};
use crate::correlation::{Completion, PendingTable};
use crate::diagnostics::{DiagnosticLine, DiagnosticSink, FileSink, TracingSink, run_diagnostics_loop};
use crate::error::{WorkerError, WorkerResult};
use crate::process::{ProcessHandle, WorkerProcess};
use crate::protocol::{RequestId, RequestParams, WorkerRequest};
use writer::{INPUT_CLOSED, WRITE_QUEUE_CAPACITY, WriteRequest};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Default capacity of the diagnostics broadcast channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type WorkerStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Options applied when wiring a client to a process
pub struct ClientOptions {
    pub sinks: Vec<Arc<dyn DiagnosticSink>>,
    pub timeouts: TimeoutConfig,
    pub channel_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sinks: vec![Arc::new(TracingSink)],
            timeouts: TimeoutConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle to a running worker. Cheap to clone; clones share the process.
#[derive(Clone)]
pub struct WorkerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    process: Mutex<Box<dyn ProcessHandle>>,
    /// Queue into the writer task; taken on shutdown to release stdin
    writer: parking_lot::Mutex<Option<mpsc::Sender<WriteRequest>>>,
    pending: Arc<PendingTable>,
    sinks: Arc<Vec<Arc<dyn DiagnosticSink>>>,
    diagnostics_tx: broadcast::Sender<DiagnosticLine>,
    tasks: parking_lot::Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    closed: AtomicBool,
    timeouts: TimeoutConfig,
    pid: Option<u32>,
}

/// Removes a call's waiter if the call ends without it being resolved
struct ForgetOnDrop<'a> {
    pending: &'a PendingTable,
    id: &'a RequestId,
}

impl Drop for ForgetOnDrop<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.id.as_str());
    }
}

impl WorkerClient {
    /// Spawn the worker described by `config`
    pub async fn spawn(config: &EasyArtConfig) -> WorkerResult<Self> {
        let mut builder = Self::builder(config.worker.clone())
            .timeouts(config.timeouts.clone())
            .channel_capacity(config.diagnostics.channel_capacity)
            .forward_to_tracing(config.diagnostics.forward_to_tracing);

        if let Some(path) = &config.diagnostics.log_file {
            match FileSink::create(path) {
                Ok(sink) => builder = builder.sink(Arc::new(sink)),
                Err(e) => warn!("Worker log file {} unavailable: {}", path.display(), e),
            }
        }

        builder.spawn().await
    }

    pub fn builder(launch: WorkerLaunchConfig) -> WorkerClientBuilder {
        WorkerClientBuilder::new(launch)
    }

    /// Wire a client to an already running process.
    ///
    /// Must be called from within a tokio runtime; the response reader and
    /// diagnostics loops are spawned onto it.
    pub fn from_process(
        mut process: Box<dyn ProcessHandle>,
        options: ClientOptions,
    ) -> WorkerResult<Self> {
        let stdio = process
            .take_stdio()
            .ok_or_else(|| WorkerError::startup("worker standard streams already taken"))?;

        let pending = Arc::new(PendingTable::new());
        let sinks = Arc::new(options.sinks);
        let (diagnostics_tx, _) = broadcast::channel(options.channel_capacity.max(1));

        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);

        let mut tasks = Vec::with_capacity(3);
        tasks.push((
            "stdin",
            tokio::spawn(writer::run_writer_loop(stdio.stdin, writer_rx)),
        ));
        tasks.push((
            "stdout",
            tokio::spawn(reader::run_response_loop(stdio.stdout, Arc::clone(&pending))),
        ));
        match stdio.stderr {
            Some(stderr) => tasks.push((
                "stderr",
                tokio::spawn(run_diagnostics_loop(
                    stderr,
                    Arc::clone(&sinks),
                    diagnostics_tx.clone(),
                )),
            )),
            None => debug!("Worker stderr not captured; diagnostics forwarding disabled"),
        }

        let pid = process.pid();
        Ok(Self {
            inner: Arc::new(ClientInner {
                process: Mutex::new(process),
                writer: parking_lot::Mutex::new(Some(writer_tx)),
                pending,
                sinks,
                diagnostics_tx,
                tasks: parking_lot::Mutex::new(tasks),
                closed: AtomicBool::new(false),
                timeouts: options.timeouts,
                pid,
            }),
        })
    }

    /// Send `method` with `params` and wait for the matching response.
    ///
    /// Resolves with the response's `result`, or fails with `Remote` if the
    /// worker answered with an error, `Cancelled` if `cancel` fired first, or
    /// `Terminated` if the worker went away.
    #[instrument(skip(self, params, cancel), level = "debug")]
    pub async fn call(
        &self,
        method: &str,
        params: RequestParams,
        cancel: &CancellationToken,
    ) -> WorkerResult<Value> {
        if cancel.is_cancelled() {
            return Err(WorkerError::cancelled(method));
        }

        let id = RequestId::generate();
        let mut waiter = self.inner.pending.register(id.clone())?;
        let _forget = ForgetOnDrop {
            pending: &self.inner.pending,
            id: &id,
        };

        let line = WorkerRequest::new(&id, method, &params).to_line()?;
        let sent = tokio::select! {
            result = self.submit_line(line) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let completed = match sent {
            Some(Err(e)) => return Err(e),
            Some(Ok(())) => {
                debug!(%id, "Request sent");
                tokio::select! {
                    // A fired token still loses to a response already in the table.
                    biased;
                    _ = cancel.cancelled() => None,
                    completion = &mut waiter => Some(completion),
                }
            }
            // Cancelled before the write finished; the writer still sends the
            // whole line and any answer is discarded as late.
            None => None,
        };

        let completion = match completed {
            Some(completion) => completion,
            None => {
                // Loses to a response or termination that got there first.
                if self.inner.pending.resolve(id.as_str(), Completion::Cancelled) {
                    debug!(%id, "Call cancelled");
                }
                waiter.await
            }
        };

        completion.into_result(method)
    }

    /// `call` bounded by `timeout`; expiry surfaces as `Cancelled`
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: RequestParams,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WorkerResult<Value> {
        let child = cancel.child_token();
        let timer = {
            let child = child.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                child.cancel();
            })
        };
        let result = self.call(method, params, &child).await;
        timer.abort();
        result
    }

    /// Hand `line` to the writer task and wait until it is on the pipe
    async fn submit_line(&self, line: String) -> WorkerResult<()> {
        let queue = self
            .inner
            .writer
            .lock()
            .clone()
            .ok_or_else(|| WorkerError::terminated(INPUT_CLOSED))?;
        writer::submit(queue, line).await
    }

    /// Receive every line the worker writes to stderr from now on
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticLine> {
        self.inner.diagnostics_tx.subscribe()
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// OS process id of the worker, if known
    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }
}

/// Builder for spawning a [`WorkerClient`]
pub struct WorkerClientBuilder {
    launch: WorkerLaunchConfig,
    sinks: Vec<Arc<dyn DiagnosticSink>>,
    timeouts: TimeoutConfig,
    channel_capacity: usize,
    forward_to_tracing: bool,
}

impl WorkerClientBuilder {
    pub fn new(launch: WorkerLaunchConfig) -> Self {
        Self {
            launch,
            sinks: Vec::new(),
            timeouts: TimeoutConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            forward_to_tracing: true,
        }
    }

    /// Add a sink for worker stderr lines
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Whether to also emit worker stderr through `tracing` (default on)
    pub fn forward_to_tracing(mut self, enabled: bool) -> Self {
        self.forward_to_tracing = enabled;
        self
    }

    pub async fn spawn(self) -> WorkerResult<WorkerClient> {
        let process = WorkerProcess::start(&self.launch)?;

        let mut sinks = self.sinks;
        if self.forward_to_tracing {
            sinks.insert(0, Arc::new(TracingSink));
        }

        WorkerClient::from_process(
            Box::new(process),
            ClientOptions {
                sinks,
                timeouts: self.timeouts,
                channel_capacity: self.channel_capacity,
            },
        )
    }
}
