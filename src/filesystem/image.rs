// src/filesystem/image.rs

//! Single-file image replacement
//!
//! Image installs (AppImage and similar) consist of one executable file
//! whose path is published by the runtime in an environment variable.
//! The image is replaced as a unit: delete the current file, move the new
//! one into the vacated path, then restore the execute bits.
//!
//! Deleting a running image is fine on platforms that support image
//! installs, since the mapped inode stays alive until the process exits.

use super::move_file;
use crate::config::{DEFAULT_IMAGE_ENV_VAR, UpdaterConfig};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Image replacement failures
#[derive(Error, Debug)]
pub enum ReplaceError {
    /// The runtime did not tell us where the running image lives
    #[error("Environment variable {0} is not set; cannot locate the running image")]
    EnvironmentMissing(String),

    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    /// The current image could not be removed; it is still intact
    #[error("Failed to delete current image {path}: {source}")]
    DeleteFailed { path: PathBuf, source: io::Error },

    /// The current image is gone and the new one is not in place
    #[error("Failed to move new image to {path}: {source}")]
    MoveFailed { path: PathBuf, source: io::Error },
}

/// Outcome of a successful replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub image_path: PathBuf,
    /// False when the execute bits could not be set and need fixing by hand
    pub executable: bool,
}

/// Replaces the running single-file image
#[derive(Debug, Clone)]
pub struct ImageReplacer {
    env_var: String,
}

impl Default for ImageReplacer {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_ENV_VAR)
    }
}

impl ImageReplacer {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.image_env_var.clone())
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// Resolve the running image from an environment lookup
    ///
    /// An empty value counts as missing.
    pub fn resolve_image_path<F>(&self, lookup: F) -> Result<PathBuf, ReplaceError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let value = lookup(&self.env_var)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ReplaceError::EnvironmentMissing(self.env_var.clone()))?;

        let path = PathBuf::from(value);
        if !path.exists() {
            return Err(ReplaceError::ImageNotFound(path));
        }
        Ok(path)
    }

    /// Replace the image named by the process environment
    pub fn replace_self_image(&self, new_image: &Path) -> Result<ImageReport, ReplaceError> {
        let current = self.resolve_image_path(|key| std::env::var_os(key))?;
        self.replace_at(&current, new_image)
    }

    /// Replace `current` with `new_image`
    pub fn replace_at(&self, current: &Path, new_image: &Path) -> Result<ImageReport, ReplaceError> {
        self.replace_with(current, new_image, move_file)
    }

    fn replace_with<F>(
        &self,
        current: &Path,
        new_image: &Path,
        move_in: F,
    ) -> Result<ImageReport, ReplaceError>
    where
        F: FnOnce(&Path, &Path) -> io::Result<()>,
    {
        // Never delete the old image without a replacement in hand
        if !new_image.is_file() {
            return Err(ReplaceError::ImageNotFound(new_image.to_path_buf()));
        }

        info!(
            "Replacing image {} with {}",
            current.display(),
            new_image.display()
        );

        fs::remove_file(current).map_err(|source| ReplaceError::DeleteFailed {
            path: current.to_path_buf(),
            source,
        })?;

        if let Err(source) = move_in(new_image, current) {
            error!(
                "Image {} was deleted but the new image could not be moved in: {}",
                current.display(),
                source
            );
            return Err(ReplaceError::MoveFailed {
                path: current.to_path_buf(),
                source,
            });
        }

        let executable = match make_executable(current) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Replaced {} but could not set execute permissions: {}",
                    current.display(),
                    e
                );
                false
            }
        };

        info!("Image replaced: {}", current.display());
        Ok(ImageReport {
            image_path: current.to_path_buf(),
            executable,
        })
    }
}

/// Add execute permission for owner, group and others
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

/// Execute bits do not exist here; the file only has to be present
#[cfg(not(unix))]
pub fn make_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}
