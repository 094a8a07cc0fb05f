//! Configuration for the worker client

mod diagnostics_config;
mod file_loader;
mod launch;
mod logging_config;
mod model;
mod timeouts;

pub use diagnostics_config::DiagnosticsConfig;
pub use file_loader::{load_config, save_config};
pub use launch::WorkerLaunchConfig;
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::EasyArtConfig;
pub use timeouts::TimeoutConfig;
