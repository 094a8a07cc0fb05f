//! Easy Artistry worker CLI
//!
//! Drives the image worker from the command line: generate images, control
//! the local Stable Diffusion backend, or send any method by name.
//!
//! ```bash
//! easyart generate "a cat on a sofa" --size 640x896 -n 2
//! easyart local start --model-path models/sdxl.safetensors
//! easyart call local_sd.status --params '{}'
//! ```

mod args;
mod commands;
mod console;
mod logging;
mod router;

use clap::Parser;

pub use args::{Cli, Commands, ConfigAction, LocalAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::resolve_config(&cli)?;
    logging::init(&config.logging, cli.verbose)?;

    router::route(cli, config).await
}
