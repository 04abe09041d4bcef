// src/filesystem/reconcile.rs

//! Digest-based tree reconciliation
//!
//! Brings an installation in line with a freshly extracted build, touching
//! only files whose content actually changed. Work happens in two passes:
//!
//! 1. **Plan**: walk the new tree parent-before-child, create any missing
//!    directories in the installation and hash every file on both sides.
//! 2. **Apply**: for each changed file, rename the installed copy aside
//!    with the deprecated suffix, then move the new file into place.
//!
//! Every failure that can be detected without mutating files (unreadable
//! input, a directory that cannot be created, a directory squatting on a
//! file or symlink path) surfaces during planning, before the first swap. Files that
//! were swapped before an apply-time failure stay swapped; there is no
//! rollback of the attempt.

use super::{deprecated_path, is_deprecated, move_file};
use crate::config::UpdaterConfig;
use crate::hash::{HashAlgorithm, file_digest, hash_file};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Reconciliation failures
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A directory needed by the new build could not be created
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreateFailed { path: PathBuf, source: io::Error },

    /// Renaming an installed file aside or moving its replacement in failed
    #[error("Failed to replace {path}: {source}")]
    FileSwapFailed { path: PathBuf, source: io::Error },

    /// The installation has a directory where the new build has a file or
    /// symlink; detected before anything is modified
    #[error("Cannot replace directory {path} with a file")]
    TypeConflict { path: PathBuf },

    /// A file could not be read to compute its digest
    #[error("Failed to read {path}: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    /// Walking the extracted tree failed
    #[error("Failed to walk extracted tree: {0}")]
    Walk(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One path visited during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiffEntry {
    /// Path relative to both roots
    pub relative_path: PathBuf,
    pub kind: EntryKind,
    /// Directory: had to be created. File: digest differed or target absent.
    pub changed: bool,
}

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub created_directories: usize,
    pub swapped_files: usize,
    pub unchanged_files: usize,
    /// Every visited entry, in walk order
    pub entries: Vec<FileDiffEntry>,
}

impl ReconcileReport {
    /// True if nothing in the installation was modified
    pub fn is_noop(&self) -> bool {
        self.created_directories == 0 && self.swapped_files == 0
    }
}

/// Pending file swap produced by the planning pass
struct Swap {
    source: PathBuf,
    target: PathBuf,
}

/// Reconciles an extracted build into an installation
#[derive(Debug, Clone)]
pub struct Reconciler {
    algorithm: HashAlgorithm,
    deprecated_extension: String,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), super::DEPRECATED_EXTENSION)
    }
}

impl Reconciler {
    pub fn new(algorithm: HashAlgorithm, deprecated_extension: impl Into<String>) -> Self {
        Self {
            algorithm,
            deprecated_extension: deprecated_extension.into(),
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.hash_algorithm, config.deprecated_extension.clone())
    }

    /// Reconcile `extracted_root` into `install_root`
    pub fn reconcile(
        &self,
        extracted_root: &Path,
        install_root: &Path,
    ) -> Result<ReconcileReport, ReconcileError> {
        info!(
            "Reconciling {} into {} ({} digests)",
            extracted_root.display(),
            install_root.display(),
            self.algorithm
        );

        let mut report = ReconcileReport::default();
        let swaps = self.plan(extracted_root, install_root, &mut report)?;

        for swap in &swaps {
            self.swap(&swap.source, &swap.target)?;
            report.swapped_files += 1;
        }

        info!(
            "Reconciliation complete: {} directories created, {} files replaced, {} unchanged",
            report.created_directories, report.swapped_files, report.unchanged_files
        );
        Ok(report)
    }

    /// Walk, hash and create directories; no file is modified here
    fn plan(
        &self,
        extracted_root: &Path,
        install_root: &Path,
        report: &mut ReconcileReport,
    ) -> Result<Vec<Swap>, ReconcileError> {
        let mut swaps = Vec::new();

        let walker = WalkDir::new(extracted_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| ReconcileError::Walk(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(extracted_root)
                .map_err(|e| ReconcileError::Walk(e.to_string()))?
                .to_path_buf();
            let target = install_root.join(&relative);

            if entry.file_type().is_dir() {
                let created = ensure_directory(&target)?;
                if created {
                    report.created_directories += 1;
                }
                report.entries.push(FileDiffEntry {
                    relative_path: relative,
                    kind: EntryKind::Directory,
                    changed: created,
                });
                continue;
            }

            if is_deprecated(&relative, &self.deprecated_extension) {
                debug!("Ignoring marker file in new build: {}", relative.display());
                continue;
            }

            if target.symlink_metadata().is_ok_and(|m| m.is_dir()) {
                error!(
                    "{} is a directory in the installation but not in the new build",
                    target.display()
                );
                return Err(ReconcileError::TypeConflict { path: target });
            }

            let changed = if entry.file_type().is_symlink() {
                symlink_changed(entry.path(), &target)?
            } else {
                self.content_changed(entry.path(), &target)?
            };

            if changed {
                debug!("Changed: {}", relative.display());
                swaps.push(Swap {
                    source: entry.path().to_path_buf(),
                    target,
                });
            } else {
                report.unchanged_files += 1;
            }

            report.entries.push(FileDiffEntry {
                relative_path: relative,
                kind: EntryKind::File,
                changed,
            });
        }

        debug!("Planned {} file swaps", swaps.len());
        Ok(swaps)
    }

    fn content_changed(&self, source: &Path, target: &Path) -> Result<bool, ReconcileError> {
        let new_digest =
            hash_file(self.algorithm, source).map_err(|source_err| ReconcileError::Unreadable {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        let installed_digest =
            file_digest(self.algorithm, target).map_err(|source_err| ReconcileError::Unreadable {
                path: target.to_path_buf(),
                source: source_err,
            })?;

        Ok(installed_digest.as_ref() != Some(&new_digest))
    }

    /// Rename the installed file aside, then move the new file in
    fn swap(&self, source: &Path, target: &Path) -> Result<(), ReconcileError> {
        let aside = deprecated_path(target, &self.deprecated_extension);
        let had_existing = target.symlink_metadata().is_ok();

        if had_existing {
            // Marker left by an earlier update that was never swept
            if aside.symlink_metadata().is_ok() {
                fs::remove_file(&aside).map_err(|e| swap_failed(target, e))?;
            }
            fs::rename(target, &aside).map_err(|e| swap_failed(target, e))?;
        }

        if let Err(e) = move_file(source, target) {
            if had_existing {
                match fs::rename(&aside, target) {
                    Ok(()) => debug!("Restored {} after failed move", target.display()),
                    Err(restore_err) => error!(
                        "Could not restore {} from {}: {}",
                        target.display(),
                        aside.display(),
                        restore_err
                    ),
                }
            }
            return Err(swap_failed(target, e));
        }

        debug!("Replaced {}", target.display());
        Ok(())
    }
}

fn swap_failed(path: &Path, source: io::Error) -> ReconcileError {
    error!("Failed to replace {}: {}", path.display(), source);
    ReconcileError::FileSwapFailed {
        path: path.to_path_buf(),
        source,
    }
}

/// Create `path` if missing; returns whether it was created
fn ensure_directory(path: &Path) -> Result<bool, ReconcileError> {
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path).map_err(|source| {
        error!("Failed to create directory {}: {}", path.display(), source);
        ReconcileError::DirectoryCreateFailed {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!("Created directory {}", path.display());
    Ok(true)
}

/// Symlinks are compared by link target, not by the content they point at
fn symlink_changed(source: &Path, target: &Path) -> Result<bool, ReconcileError> {
    let new_link = fs::read_link(source).map_err(|e| ReconcileError::Unreadable {
        path: source.to_path_buf(),
        source: e,
    })?;
    match fs::read_link(target) {
        Ok(installed) => Ok(installed != new_link),
        Err(_) => Ok(true),
    }
}
