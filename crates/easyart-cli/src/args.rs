//! CLI argument definitions using clap
//!
//! - easyart generate "prompt"       # Generate images
//! - easyart local start|shutdown    # Control the local backend
//! - easyart local switch <model>    # Switch the local model
//! - easyart call <method>           # Send any method
//! - easyart config show|init        # Configuration files

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "easyart_config.json";

#[derive(Parser, Debug)]
#[command(name = "easyart")]
#[command(about = "Easy Artistry - drive the image worker from the command line")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Python interpreter used to run the worker
    #[arg(long, global = true, env = "EASY_ARTISTRY_PYTHON")]
    pub python: Option<PathBuf>,

    /// Worker script path
    #[arg(long, global = true, env = "EASY_ARTISTRY_WORKER")]
    pub worker: Option<PathBuf>,

    /// Working directory for the worker process
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Give up on the call after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate images from a prompt and print their paths
    Generate(GenerateArgs),

    /// Control the local Stable Diffusion backend
    Local {
        #[command(subcommand)]
        action: LocalAction,
    },

    /// Send an arbitrary method and print the raw result
    Call {
        /// Method name, e.g. local_sd.status
        method: String,

        /// Parameters as a JSON value
        #[arg(long)]
        params: Option<String>,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Text prompt
    pub prompt: String,

    /// Image size as WIDTHxHEIGHT
    #[arg(long)]
    pub size: Option<String>,

    /// Number of images
    #[arg(short = 'n', long = "count")]
    pub count: Option<u32>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Quality preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Negative prompt
    #[arg(long)]
    pub negative_prompt: Option<String>,

    /// Backend override as KEY=VALUE (VALUE is parsed as JSON when possible)
    #[arg(long = "sd-param", value_parser = parse_key_value)]
    pub sd_params: Vec<(String, Value)>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LocalAction {
    /// Start the local backend
    Start {
        /// Checkpoint to load on startup
        #[arg(long)]
        model_path: Option<String>,
    },

    /// Stop the local backend
    Shutdown,

    /// Switch the loaded model
    Switch {
        /// Model name as known to the backend
        name: String,

        /// Seconds the worker may wait for the model to load
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Create a new configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Parse `KEY=VALUE`, reading VALUE as JSON and falling back to a string
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "easyart",
            "generate",
            "a cat",
            "-n",
            "2",
            "--size",
            "640x896",
            "--sd-param",
            "steps=26",
            "--sd-param",
            "sampler_name=DPM++ 2M",
            "--timeout",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.timeout, Some(30));
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.prompt, "a cat");
        assert_eq!(args.count, Some(2));
        assert_eq!(args.size.as_deref(), Some("640x896"));
        assert_eq!(
            args.sd_params,
            vec![
                ("steps".to_string(), json!(26)),
                ("sampler_name".to_string(), json!("DPM++ 2M")),
            ]
        );
    }

    #[test]
    fn test_parse_local_switch() {
        let cli = Cli::try_parse_from(["easyart", "local", "switch", "sdxl", "--timeout", "120"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Local {
                action: LocalAction::Switch { ref name, timeout: Some(120) }
            } if name == "sdxl"
        ));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("enable_hr=true").unwrap(),
            ("enable_hr".to_string(), json!(true))
        );
        assert_eq!(
            parse_key_value("denoise=0.45").unwrap(),
            ("denoise".to_string(), json!(0.45))
        );
        assert_eq!(
            parse_key_value("upscaler=Latent").unwrap(),
            ("upscaler".to_string(), json!("Latent"))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=1").is_err());
    }
}
