//! Worker process supervision
//!
//! Spawns the worker with piped standard streams and no shell, and exposes
//! it behind [`ProcessHandle`] so the client can be driven by any peer that
//! provides the three streams.

use crate::config::WorkerLaunchConfig;
use crate::error::{WorkerError, WorkerResult};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Hides the console window a Windows console child would otherwise get
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// The worker's standard streams, detached from the process handle
pub struct WorkerStdio {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
}

impl std::fmt::Debug for WorkerStdio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerStdio")
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Lifecycle operations on a running worker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Take the standard streams. Returns `None` after the first call.
    fn take_stdio(&mut self) -> Option<WorkerStdio>;

    /// Whether the process is still running
    fn is_alive(&mut self) -> bool;

    /// Request termination without waiting.
    ///
    /// Best-effort and idempotent: returns `Ok(true)` only for the call that
    /// actually issued the kill, `Ok(false)` if the process had already
    /// exited or was already killed.
    fn kill(&mut self) -> WorkerResult<bool>;

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `Ok(None)` if it is still running when the timeout elapses.
    async fn wait(&mut self, timeout: Duration) -> WorkerResult<Option<ExitStatus>>;
}

/// A worker spawned as an OS child process
pub struct WorkerProcess {
    child: Child,
    stdio: Option<WorkerStdio>,
    kill_issued: bool,
}

impl WorkerProcess {
    /// Spawn the worker described by `launch`.
    ///
    /// The command line is `executable [unbuffered_flag] script [extra_args...]`
    /// run directly (no shell) with stdin, stdout and stderr piped.
    pub fn start(launch: &WorkerLaunchConfig) -> WorkerResult<Self> {
        let executable = launch.resolved_executable();
        let args = launch.command_line();

        let mut cmd = Command::new(&executable);
        cmd.args(&args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = launch.resolved_working_dir() {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        debug!("Spawning worker: {} {:?}", executable.display(), args);

        let mut child = cmd.spawn().map_err(|e| {
            WorkerError::startup(format!(
                "failed to spawn '{}': {}",
                executable.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::startup("failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::startup("failed to get stdout handle"))?;
        let stderr = child.stderr.take();

        info!("Worker started (pid {:?})", child.id());

        Ok(Self {
            child,
            stdio: Some(WorkerStdio {
                stdin: Box::new(stdin),
                stdout: Box::new(stdout),
                stderr: stderr.map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>),
            }),
            kill_issued: false,
        })
    }
}

#[async_trait]
impl ProcessHandle for WorkerProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdio(&mut self) -> Option<WorkerStdio> {
        self.stdio.take()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) -> WorkerResult<bool> {
        if self.kill_issued || !self.is_alive() {
            return Ok(false);
        }

        match self.child.start_kill() {
            Ok(()) => {
                self.kill_issued = true;
                info!("Worker kill issued (pid {:?})", self.child.id());
                Ok(true)
            }
            // Raced with a natural exit.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(false),
            Err(e) => {
                warn!("Failed to kill worker: {}", e);
                Err(e.into())
            }
        }
    }

    async fn wait(&mut self, timeout: Duration) -> WorkerResult<Option<ExitStatus>> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => Ok(Some(status?)),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // Best effort cleanup; kill_on_drop covers the rest
        if !self.kill_issued {
            let _ = self.child.start_kill();
        }
    }
}
