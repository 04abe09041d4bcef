// src/install.rs

//! Packaging strategies
//!
//! An installation is either a directory of loose files or a single
//! executable image. Each has its own [`InstallStrategy`]; which one runs is
//! decided once at startup by [`strategy_for`], not by branching inside the
//! update flow.

use crate::config::UpdaterConfig;
use crate::error::Result;
use crate::filesystem::{
    AutoExtractor, Extractor, ImageReplacer, ImageReport, ReconcileReport, Reconciler,
};
use crate::remote::DownloadedArtifact;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Packaging mode as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingMode {
    /// Image when the image environment variable is set, else directory
    #[default]
    Auto,
    Directory,
    Image,
}

impl PackagingMode {
    /// Resolve `Auto` against an environment lookup
    pub fn resolve_with<F>(self, image_env_var: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        match self {
            Self::Auto => {
                if lookup(image_env_var).is_some_and(|v| !v.is_empty()) {
                    Self::Image
                } else {
                    Self::Directory
                }
            }
            mode => mode,
        }
    }

    /// Resolve `Auto` against the process environment
    pub fn resolve(self, image_env_var: &str) -> Self {
        self.resolve_with(image_env_var, |key| std::env::var_os(key))
    }
}

impl fmt::Display for PackagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Directory => write!(f, "directory"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Installation stage, reported as a strategy progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Reconciling,
    ReplacingImage,
}

/// What an install changed
#[derive(Debug, Clone)]
pub enum InstallReport {
    Directory(ReconcileReport),
    Image(ImageReport),
}

/// Installs a downloaded artifact
pub trait InstallStrategy: Send + Sync {
    /// Concrete mode (never `Auto`)
    fn mode(&self) -> PackagingMode;

    /// Install `artifact`, calling `on_stage` as each stage begins
    fn install(
        &self,
        artifact: &DownloadedArtifact,
        on_stage: &dyn Fn(Stage),
    ) -> Result<InstallReport>;
}

/// Extract the archive, then reconcile it into the install root
pub struct DirectoryInstall {
    extractor: Box<dyn Extractor>,
    reconciler: Reconciler,
    install_root: PathBuf,
}

impl DirectoryInstall {
    pub fn new(
        extractor: Box<dyn Extractor>,
        reconciler: Reconciler,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            reconciler,
            install_root: install_root.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }
}

impl InstallStrategy for DirectoryInstall {
    fn mode(&self) -> PackagingMode {
        PackagingMode::Directory
    }

    fn install(
        &self,
        artifact: &DownloadedArtifact,
        on_stage: &dyn Fn(Stage),
    ) -> Result<InstallReport> {
        on_stage(Stage::Extracting);
        let tree = self.extractor.extract(artifact.path())?;
        debug!("Extracted build at {}", tree.root().display());

        on_stage(Stage::Reconciling);
        let report = self.reconciler.reconcile(tree.root(), &self.install_root)?;

        Ok(InstallReport::Directory(report))
    }
}

/// Replace the running single-file image
pub struct ImageInstall {
    replacer: ImageReplacer,
    image_path: Option<PathBuf>,
}

impl ImageInstall {
    /// Locate the image through the replacer's environment variable
    pub fn new(replacer: ImageReplacer) -> Self {
        Self {
            replacer,
            image_path: None,
        }
    }

    /// Replace a known image path instead of consulting the environment
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

impl InstallStrategy for ImageInstall {
    fn mode(&self) -> PackagingMode {
        PackagingMode::Image
    }

    fn install(
        &self,
        artifact: &DownloadedArtifact,
        on_stage: &dyn Fn(Stage),
    ) -> Result<InstallReport> {
        on_stage(Stage::ReplacingImage);
        let report = match &self.image_path {
            Some(current) => {
                let current = self
                    .replacer
                    .resolve_image_path(|_| Some(current.clone().into_os_string()))?;
                self.replacer.replace_at(&current, artifact.path())?
            }
            None => self.replacer.replace_self_image(artifact.path())?,
        };
        Ok(InstallReport::Image(report))
    }
}

/// Build the strategy selected by the configuration
pub fn strategy_for(config: &UpdaterConfig, install_root: &Path) -> Box<dyn InstallStrategy> {
    let mode = config.packaging.resolve(&config.image_env_var);
    info!("Packaging mode: {} (configured {})", mode, config.packaging);

    match mode {
        PackagingMode::Image => Box::new(ImageInstall::new(ImageReplacer::from_config(config))),
        _ => {
            let extractor = AutoExtractor::new(
                config.seven_zip_path(install_root),
                config.staging_dir.clone(),
            );
            Box::new(DirectoryInstall::new(
                Box::new(extractor),
                Reconciler::from_config(config),
                install_root,
            ))
        }
    }
}
