// src/filesystem/mod.rs

//! Filesystem side of the updater
//!
//! This module provides:
//! - Extraction of downloaded builds into private staging directories
//! - Digest-based reconciliation of a new build tree into the installation
//! - The startup sweep that removes files superseded by earlier updates
//! - In-place replacement of a single-file application image
//!
//! Superseded files are never deleted during an update. They are renamed
//! with the [`DEPRECATED_EXTENSION`] suffix and removed by the next sweep.

mod extract;
mod image;
mod reconcile;
mod sweep;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub use extract::{
    AutoExtractor, ArchiveKind, ExtractError, ExtractedTree, Extractor, SevenZipExtractor,
    TarballExtractor,
};
pub use image::{ImageReplacer, ImageReport, ReplaceError, make_executable};
pub use reconcile::{EntryKind, FileDiffEntry, ReconcileError, ReconcileReport, Reconciler};
pub use sweep::{SweepReport, Sweeper};

/// Suffix marking a file as superseded and pending removal
pub const DEPRECATED_EXTENSION: &str = "rpcs3-deprecated";

/// Directory names holding user data; the sweeper never enters them
pub const PROTECTED_DIRECTORIES: &[&str] = &[
    "dev_hdd0",
    "dev_hdd1",
    "data",
    "dev_flash",
    "dev_usb000",
    "shaderlog",
];

/// Prefix of every staging directory this crate creates
const STAGING_PREFIX: &str = "rpcs3-update-";

/// Create a fresh private staging directory
///
/// Each call returns a new directory; it is deleted when the handle drops.
pub fn staging_dir(purpose: &str, parent: Option<&Path>) -> io::Result<TempDir> {
    let prefix = format!("{STAGING_PREFIX}{purpose}-");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    debug!("Created staging directory {}", dir.path().display());
    Ok(dir)
}

/// Path a superseded file is renamed to: `<name>.<extension>` next to it
pub fn deprecated_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// True if `path` carries the deprecated marker suffix
pub fn is_deprecated(path: &Path, extension: &str) -> bool {
    let suffix = format!(".{extension}");
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| name.len() > suffix.len() && name.ends_with(&suffix))
}

/// Move a file, falling back to copy + remove when rename is not possible
///
/// Staging directories usually live on another filesystem than the
/// installation, where `rename` fails with a cross-device error.
pub(crate) fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "Rename {} -> {} failed ({}), falling back to copy",
                source.display(),
                target.display(),
                rename_err
            );
            if let Err(copy_err) = fs::copy(source, target) {
                // Do not leave a truncated copy at the target
                let _ = fs::remove_file(target);
                return Err(copy_err);
            }
            fs::remove_file(source)
        }
    }
}
