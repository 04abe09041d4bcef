// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use rpcs3_updater::UpdaterConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = commands::load_config(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.install_root = Some(root);
    }

    match cli.command {
        Commands::Config => commands::cmd_config(&config),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "rpcs3-updater",
                &mut std::io::stdout(),
            );
            Ok(())
        }
        Commands::Sweep => {
            let root = config.resolve_install_root()?;
            commands::cmd_sweep(&config, &root)
        }
        Commands::Check => {
            let root = prepare_root(&config)?;
            commands::cmd_check(&config, &root)
        }
        Commands::Update { yes } => {
            let root = prepare_root(&config)?;
            commands::cmd_update(&config, &root, yes)
        }
        Commands::Apply { extracted_dir } => {
            let root = prepare_root(&config)?;
            commands::cmd_apply(&config, &root, &extracted_dir)
        }
    }
}

/// Resolve the install root and sweep leftovers from earlier updates
fn prepare_root(config: &UpdaterConfig) -> Result<PathBuf> {
    let root = config.resolve_install_root()?;
    debug!("Install root: {}", root.display());
    commands::startup_sweep(config, &root);
    Ok(root)
}
