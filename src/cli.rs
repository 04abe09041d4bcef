// src/cli.rs
//! CLI definitions for the RPCS3 updater
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rpcs3-updater")]
#[command(author = "RPCS3 Updater Contributors")]
#[command(version)]
#[command(about = "Check for, download and install RPCS3 builds", long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/rpcs3-updater/updater.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Installation root (default: directory of the running executable)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest build available for this platform
    Check,

    /// Download and install the latest build
    Update {
        /// Install without asking; otherwise only show what would be downloaded
        #[arg(short, long)]
        yes: bool,
    },

    /// Reconcile an already extracted build into the installation
    Apply {
        /// Directory holding the extracted build
        extracted_dir: PathBuf,
    },

    /// Delete files left behind by earlier updates
    Sweep,

    /// Print the effective configuration
    Config,

    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}
