//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction, LocalAction};
use crate::commands;
use easyart_core::EasyArtConfig;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: EasyArtConfig) -> anyhow::Result<()> {
    let session = commands::worker::Session::new(config, cli.timeout, cli.verbose);

    match cli.command {
        Commands::Generate(args) => commands::worker::generate(&session, args).await,
        Commands::Local { action } => match action {
            LocalAction::Start { model_path } => {
                commands::worker::local_start(&session, model_path).await
            }
            LocalAction::Shutdown => commands::worker::local_shutdown(&session).await,
            LocalAction::Switch { name, timeout } => {
                commands::worker::local_switch(&session, &name, timeout).await
            }
        },
        Commands::Call { method, params } => {
            commands::worker::call(&session, &method, params.as_deref()).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&cli.config, session.config()),
            ConfigAction::Init { force } => commands::config::init(&cli.config, force),
        },
    }
}
