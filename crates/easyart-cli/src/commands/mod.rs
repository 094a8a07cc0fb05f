//! CLI commands

pub mod config;
pub mod worker;

use crate::args::Cli;
use anyhow::Context;
use easyart_core::{EasyArtConfig, load_config};

/// Load the configuration file and apply command-line overrides
pub fn resolve_config(cli: &Cli) -> anyhow::Result<EasyArtConfig> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if let Some(python) = &cli.python {
        config.worker.executable = python.clone();
    }
    if let Some(worker) = &cli.worker {
        config.worker.script = worker.clone();
    }
    if let Some(dir) = &cli.working_dir {
        config.worker.working_dir = Some(dir.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("easyart.toml");
        std::fs::write(
            &path,
            "[worker]\nexecutable = \"/opt/python/bin/python3\"\nscript = \"from_file.py\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "easyart",
            "--config",
            path.to_str().unwrap(),
            "--worker",
            "from_flag.py",
            "--working-dir",
            "/srv/easyart",
            "config",
            "show",
        ])
        .unwrap();

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.worker.executable, PathBuf::from("/opt/python/bin/python3"));
        assert_eq!(config.worker.script, PathBuf::from("from_flag.py"));
        assert_eq!(config.worker.working_dir, Some(PathBuf::from("/srv/easyart")));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::try_parse_from(["easyart", "--config", path.to_str().unwrap(), "config", "show"])
            .unwrap();

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.timeouts, EasyArtConfig::default().timeouts);
    }
}
