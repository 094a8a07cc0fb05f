//! Configuration management commands

use crate::console::CLIConsole;
use anyhow::{Context, bail};
use easyart_core::EasyArtConfig;
use easyart_core::config::save_config;
use std::path::Path;

/// Show the effective configuration (file plus command-line overrides)
pub fn show(config_file: &Path, config: &EasyArtConfig) -> anyhow::Result<()> {
    let console = CLIConsole::new(true);

    console.print_header("Configuration");
    if config_file.exists() {
        console.success(&format!("Loaded configuration from: {}", config_file.display()));
    } else {
        console.warn(&format!(
            "Configuration file not found: {}",
            config_file.display()
        ));
        console.info("Using default configuration");
    }

    let rendered =
        serde_json::to_string_pretty(config).context("failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

/// Initialize a new configuration file
pub fn init(config_file: &Path, force: bool) -> anyhow::Result<()> {
    let console = CLIConsole::new(true);

    console.print_header("Configuration Initialization");

    if config_file.exists() && !force {
        console.error(&format!(
            "Configuration file already exists: {}",
            config_file.display()
        ));
        console.info("Use --force to overwrite");
        bail!("configuration file already exists");
    }

    save_config(&EasyArtConfig::default(), config_file)?;
    console.success(&format!("Created configuration file: {}", config_file.display()));
    Ok(())
}
