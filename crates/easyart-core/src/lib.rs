//! Easy Artistry worker client
//!
//! This crate drives the long-lived image worker process: it spawns the
//! worker, exchanges line-delimited JSON requests and responses over the
//! worker's stdin/stdout, forwards the worker's stderr to diagnostic sinks,
//! and exposes typed operations (image generation, local Stable Diffusion
//! server control) on top of a generic `call` primitive.
//!
//! ## Example
//!
//! ```rust,ignore
//! use easyart_core::{GenerateParams, WorkerClient, WorkerLaunchConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let launch = WorkerLaunchConfig::new("python3", "middle_layer/worker.py");
//! let client = WorkerClient::builder(launch).spawn().await?;
//!
//! let cancel = CancellationToken::new();
//! let images = client
//!     .generate(GenerateParams::new("a cat on a sofa"), &cancel)
//!     .await?;
//!
//! client.shutdown().await;
//! ```

pub mod client;
pub mod config;
pub mod correlation;
pub mod diagnostics;
pub mod error;
pub mod process;
pub mod protocol;

pub use client::{Ack, ClientOptions, ShutdownMode, WorkerClient, WorkerClientBuilder};
pub use config::{
    DiagnosticsConfig, EasyArtConfig, LoggingConfig, TimeoutConfig, WorkerLaunchConfig,
    load_config,
};
pub use correlation::{Completion, PendingTable, Waiter};
pub use diagnostics::{DiagnosticLine, DiagnosticSink, FileSink, TracingSink};
pub use error::{WorkerError, WorkerResult};
pub use process::{ProcessHandle, WorkerProcess, WorkerStdio};
pub use protocol::{GenerateParams, RemoteErrorPayload, RequestId, RequestParams, methods};
