//! hotcomp - host process for hot-reloaded UI components

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use hotcomp_loader::{ReloadConfig, RuntimeConfig};

use crate::commands::watch::WatchOverrides;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries rendered output
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output;

    match cli.command {
        Commands::Watch {
            binary,
            type_name,
            working_dir,
            debounce_ms,
            clean,
        } => {
            let config = commands::watch::resolve_config(
                cli.config.as_deref(),
                WatchOverrides {
                    binary,
                    type_name,
                    working_dir,
                    debounce_ms,
                    clean,
                },
            )?;
            commands::watch::run(config, format).await?;
        }

        Commands::Load {
            binary,
            type_name,
            working_dir,
        } => {
            let runtime = match cli.config.as_deref() {
                Some(path) => ReloadConfig::load(path)?.runtime,
                None => RuntimeConfig::default(),
            };
            commands::load::run(&binary, &type_name, &working_dir, &runtime, format)?;
        }

        Commands::Clean {
            dir,
            extension,
            keep,
        } => {
            commands::clean::run(&dir, &extension, keep.as_deref(), format)?;
        }
    }

    Ok(())
}
