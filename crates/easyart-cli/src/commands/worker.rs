//! Commands that talk to the worker
//!
//! Each command spawns the worker, runs one operation under a cancellation
//! token wired to Ctrl-C and `--timeout`, and always shuts the worker down
//! before returning. Commands that manage the local backend themselves shut
//! down without the extra `local_sd.shutdown`.

use crate::args::GenerateArgs;
use crate::console::CLIConsole;
use anyhow::Context;
use easyart_core::{EasyArtConfig, GenerateParams, ShutdownMode, WorkerClient, WorkerResult};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a worker command needs besides its own arguments
pub struct Session {
    config: EasyArtConfig,
    timeout: Option<Duration>,
    console: CLIConsole,
}

impl Session {
    pub fn new(config: EasyArtConfig, timeout_secs: Option<u64>, verbose: bool) -> Self {
        Self {
            config,
            timeout: timeout_secs.map(Duration::from_secs),
            console: CLIConsole::new(verbose),
        }
    }

    pub fn config(&self) -> &EasyArtConfig {
        &self.config
    }

    /// Spawn the worker, run `op`, and shut the worker down with `mode`
    async fn run<T, F, Fut>(&self, mode: ShutdownMode, op: F) -> anyhow::Result<T>
    where
        F: FnOnce(WorkerClient, CancellationToken) -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        let client = WorkerClient::spawn(&self.config)
            .await
            .context("failed to start worker")?;
        self.console
            .info(&format!("Worker started (pid {:?})", client.pid()));

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupted, cancelling call...");
                    cancel.cancel();
                }
            })
        };
        let deadline = self.timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                debug!("Call deadline of {:?} reached", timeout);
                cancel.cancel();
            })
        });

        let result = op(client.clone(), cancel).await;

        interrupt.abort();
        if let Some(deadline) = deadline {
            deadline.abort();
        }
        client.shutdown_with(mode).await;

        result.map_err(|e| {
            self.console.error(&e.to_string());
            anyhow::Error::new(e)
        })
    }
}

pub async fn generate(session: &Session, args: GenerateArgs) -> anyhow::Result<()> {
    let params = build_generate_params(args);
    session
        .console
        .info(&format!("Generating {} image(s) with {}", params.count, params.model));

    let images = session
        .run(ShutdownMode::StopLocalBackend, |client, cancel| async move {
            client.generate(params, &cancel).await
        })
        .await?;

    if images.is_empty() {
        session.console.warn("Worker returned no images");
    }
    for image in images {
        println!("{}", image);
    }
    Ok(())
}

pub async fn local_start(session: &Session, model_path: Option<String>) -> anyhow::Result<()> {
    let ack = session
        .run(ShutdownMode::LeaveLocalBackend, |client, cancel| async move {
            client
                .start_local_server(model_path.as_deref(), &cancel)
                .await
        })
        .await?;
    session.console.success("Local backend started");
    print_payload(&ack.payload)
}

pub async fn local_shutdown(session: &Session) -> anyhow::Result<()> {
    let ack = session
        .run(ShutdownMode::LeaveLocalBackend, |client, cancel| async move {
            client.shutdown_local_server(&cancel).await
        })
        .await?;
    session.console.success("Local backend stopped");
    print_payload(&ack.payload)
}

pub async fn local_switch(
    session: &Session,
    name: &str,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let timeout_secs =
        timeout_secs.unwrap_or_else(|| session.config.timeouts.switch_model.as_secs());
    let name = name.to_string();
    let ack = session
        .run(ShutdownMode::LeaveLocalBackend, |client, cancel| async move {
            client.switch_local_model(&name, timeout_secs, &cancel).await
        })
        .await?;
    session.console.success("Model switched");
    print_payload(&ack.payload)
}

pub async fn call(session: &Session, method: &str, params: Option<&str>) -> anyhow::Result<()> {
    let params = match params {
        Some(raw) => serde_json::from_str(raw).context("--params is not valid JSON")?,
        None => Value::Null,
    };
    let method = method.to_string();
    let result = session
        .run(ShutdownMode::StopLocalBackend, |client, cancel| async move {
            client.call_raw(&method, params, &cancel).await
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn build_generate_params(args: GenerateArgs) -> GenerateParams {
    let mut params = GenerateParams::new(args.prompt);
    if let Some(size) = args.size {
        params = params.with_size(size);
    }
    if let Some(count) = args.count {
        params = params.with_count(count);
    }
    if let Some(model) = args.model {
        params = params.with_model(model);
    }
    if let Some(preset) = args.preset {
        params = params.with_preset(preset);
    }
    if let Some(negative) = args.negative_prompt {
        params = params.with_negative_prompt(negative);
    }
    for (key, value) in args.sd_params {
        params = params.with_sd_param(key, value);
    }
    params
}

fn print_payload(payload: &Value) -> anyhow::Result<()> {
    if !payload.is_null() {
        println!("{}", serde_json::to_string_pretty(payload)?);
    }
    Ok(())
}
