// src/commands.rs
//! Command handlers for the RPCS3 updater CLI

use anyhow::{Context, Result, anyhow, bail};
use rpcs3_updater::{
    CliProgress, InstallReport, LogProgress, ProgressTracker, Reconciler, SweepReport, Sweeper,
    UpdateError, UpdateEvent, UpdateState, Updater, UpdaterConfig,
};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load the configuration named on the command line, or the default one
pub fn load_config(path: Option<&Path>) -> Result<UpdaterConfig> {
    let config = match path {
        Some(path) => UpdaterConfig::load(path)?,
        None => UpdaterConfig::load_default()?,
    };
    Ok(config)
}

/// Remove leftovers from earlier updates; never fails the command
pub fn startup_sweep(config: &UpdaterConfig, install_root: &Path) -> SweepReport {
    debug!("Startup sweep of {}", install_root.display());
    Sweeper::from_config(config).sweep(install_root)
}

pub fn cmd_check(config: &UpdaterConfig, install_root: &Path) -> Result<()> {
    let updater = Updater::from_config(config, install_root, |event| {
        if let UpdateEvent::StateChanged(state) = event {
            debug!("State: {}", state);
        }
    });

    updater
        .check_for_update()?
        .join()
        .map_err(|_| anyhow!("update check thread panicked"))?;

    match updater.build_info() {
        Some(build) => {
            println!("Latest build:");
            println!("  Pull request: {}", display_or_unknown(&build.pull_request_label));
            println!("  Built:        {}", display_or_unknown(&build.platform_datetime));
            println!("  Download:     {}", build.download_url);
            Ok(())
        }
        None => Err(attempt_error(&updater)),
    }
}

pub fn cmd_update(config: &UpdaterConfig, install_root: &Path, yes: bool) -> Result<()> {
    // Bars only make sense on a terminal; otherwise log progress steps
    let progress: Arc<dyn ProgressTracker> = if std::io::stderr().is_terminal() {
        Arc::new(CliProgress::new("Checking for updates"))
    } else {
        Arc::new(LogProgress::new("update"))
    };
    let bar = Arc::clone(&progress);

    let updater = Updater::from_config(config, install_root, move |event| match event {
        UpdateEvent::StateChanged(state) => {
            debug!("State: {}", state);
            bar.set_message(&state_message(state));
        }
        UpdateEvent::Progress { received, total } => {
            if let Some(total) = total
                && bar.length() != total
            {
                bar.set_length(total);
            }
            bar.set_position(received);
        }
        UpdateEvent::Warning(message) => warn!("{}", message),
        UpdateEvent::Failed {
            message,
            manual_intervention,
        } => {
            bar.finish_with_error(&message);
            if manual_intervention {
                eprintln!(
                    "The installation may be incomplete and needs manual repair. \
                     Reinstall RPCS3 from a fresh download."
                );
            }
        }
        UpdateEvent::BuildInfo(_) | UpdateEvent::Completed(_) => {}
    });

    info!("Packaging mode: {}", updater.packaging_mode());

    updater
        .check_for_update()?
        .join()
        .map_err(|_| anyhow!("update check thread panicked"))?;

    let Some(build) = updater.build_info() else {
        return Err(attempt_error(&updater));
    };

    if !yes {
        progress.finish_with_message("Update available");
        println!(
            "Build {} ({}) is available:",
            display_or_unknown(&build.pull_request_label),
            display_or_unknown(&build.platform_datetime)
        );
        println!("  {}", build.download_url);
        println!("Run again with --yes to install it.");
        updater.dismiss()?;
        return Ok(());
    }

    updater
        .download_latest()?
        .join()
        .map_err(|_| anyhow!("update thread panicked"))?;

    match updater.state() {
        UpdateState::Done => {
            progress.finish_with_message("Update installed");
            println!("RPCS3 was updated to build {}", build.pull_request_label);
            Ok(())
        }
        UpdateState::Cancelled => bail!("Update cancelled"),
        _ => Err(attempt_error(&updater)),
    }
}

pub fn cmd_apply(config: &UpdaterConfig, install_root: &Path, extracted_dir: &Path) -> Result<()> {
    if !extracted_dir.is_dir() {
        bail!("{} is not a directory", extracted_dir.display());
    }

    match Reconciler::from_config(config).reconcile(extracted_dir, install_root) {
        Ok(report) => {
            print_report(&InstallReport::Directory(report));
            Ok(())
        }
        Err(e) => {
            let err = UpdateError::from(e);
            if err.requires_manual_intervention() {
                eprintln!("The installation may be incomplete and needs manual repair.");
            }
            Err(err).context("Failed to apply build")
        }
    }
}

pub fn cmd_sweep(config: &UpdaterConfig, install_root: &Path) -> Result<()> {
    let report = Sweeper::from_config(config).sweep(install_root);
    println!("Deleted {} deprecated files", report.deleted.len());
    for path in &report.failed {
        println!("  Could not delete {}", path.display());
    }
    Ok(())
}

pub fn cmd_config(config: &UpdaterConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_report(report: &InstallReport) {
    match report {
        InstallReport::Directory(report) => {
            println!("Directories created: {}", report.created_directories);
            println!("Files replaced:      {}", report.swapped_files);
            println!("Files unchanged:     {}", report.unchanged_files);
        }
        InstallReport::Image(report) => {
            println!("Image replaced: {}", report.image_path.display());
            if !report.executable {
                println!("  Execute permission could not be set; fix it manually");
            }
        }
    }
}

fn attempt_error(updater: &Updater) -> anyhow::Error {
    match updater.last_error() {
        Some(message) => anyhow!(message),
        None => anyhow!("update attempt ended in state {}", updater.state()),
    }
}

fn state_message(state: UpdateState) -> String {
    match state {
        UpdateState::CheckingManifest => "Checking for updates".to_string(),
        UpdateState::Downloading => "Downloading".to_string(),
        UpdateState::Extracting => "Extracting".to_string(),
        UpdateState::Reconciling => "Updating files".to_string(),
        UpdateState::ReplacingImage => "Replacing image".to_string(),
        other => other.to_string(),
    }
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() { "unknown" } else { value }
}
