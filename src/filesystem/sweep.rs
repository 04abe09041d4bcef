// src/filesystem/sweep.rs

//! Startup sweep of superseded files
//!
//! The reconciler never deletes replaced files; it renames them aside.
//! This pass reclaims that space on the next start. It is best-effort:
//! a file that cannot be deleted today (still mapped, locked by another
//! process) is logged and retried on the next run.

use super::{DEPRECATED_EXTENSION, PROTECTED_DIRECTORIES, is_deprecated};
use crate::config::UpdaterConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    /// Files that matched but could not be removed
    pub failed: Vec<PathBuf>,
}

/// Deletes deprecated-marker files outside protected directories
#[derive(Debug, Clone)]
pub struct Sweeper {
    protected_directories: Vec<String>,
    deprecated_extension: String,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new(
            PROTECTED_DIRECTORIES.iter().map(|d| d.to_string()).collect(),
            DEPRECATED_EXTENSION,
        )
    }
}

impl Sweeper {
    pub fn new(protected_directories: Vec<String>, deprecated_extension: impl Into<String>) -> Self {
        Self {
            protected_directories,
            deprecated_extension: deprecated_extension.into(),
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(
            config.protected_directories.clone(),
            config.deprecated_extension.clone(),
        )
    }

    fn is_protected(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self
                .protected_directories
                .iter()
                .any(|name| entry.file_name() == name.as_str())
    }

    /// Sweep `root` recursively; never fails as a whole
    pub fn sweep(&self, root: &Path) -> SweepReport {
        let mut report = SweepReport::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let protected = self.is_protected(entry);
                if protected {
                    debug!("Skipping protected directory {}", entry.path().display());
                }
                !protected
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Sweep could not read an entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file()
                || !is_deprecated(entry.path(), &self.deprecated_extension)
            {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Deleted {}", entry.path().display());
                    report.deleted.push(entry.into_path());
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", entry.path().display(), e);
                    report.failed.push(entry.into_path());
                }
            }
        }

        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                "Sweep of {}: {} deprecated files deleted, {} left behind",
                root.display(),
                report.deleted.len(),
                report.failed.len()
            );
        }
        report
    }
}
