// src/config.rs

//! Updater configuration
//!
//! Every field has a default, so a missing or empty `updater.toml` yields a
//! working configuration. Unknown keys are rejected to catch typos early.

use crate::filesystem::{DEPRECATED_EXTENSION, PROTECTED_DIRECTORIES};
use crate::hash::HashAlgorithm;
use crate::install::PackagingMode;
use crate::remote::Platform;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Build manifest endpoint
pub const DEFAULT_MANIFEST_URL: &str = "https://update.rpcs3.net/?c=XXXXXXXX";

/// Environment variable naming the running image in image packaging mode
pub const DEFAULT_IMAGE_ENV_VAR: &str = "APPIMAGE";

/// File name of the configuration inside the platform config directory
const CONFIG_FILE_NAME: &str = "updater.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has unknown keys
    #[error("Failed to parse config '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Install root could not be derived from the running executable
    #[error("Cannot determine install root: {0}")]
    InstallRoot(std::io::Error),

    /// Serializing the effective configuration failed
    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Updater configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Build manifest endpoint (must be https)
    pub manifest_url: String,

    /// Installation root; defaults to the directory of the running executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_root: Option<PathBuf>,

    /// Packaging mode of this installation
    pub packaging: PackagingMode,

    /// Environment variable naming the running image (image packaging)
    pub image_env_var: String,

    /// External 7-Zip executable used for `.7z`/`.zip` builds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seven_zip: Option<PathBuf>,

    /// Parent directory for private staging directories (system temp if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    /// TCP/TLS connect timeout
    pub connect_timeout_secs: u64,

    /// Whole-request timeout for the manifest query
    pub manifest_timeout_secs: u64,

    /// Directory names holding user data; never swept
    pub protected_directories: Vec<String>,

    /// Suffix appended to superseded files
    pub deprecated_extension: String,

    /// Manifest platform key override (defaults to the build platform)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Digest used to compare installed and new files
    pub hash_algorithm: HashAlgorithm,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            install_root: None,
            packaging: PackagingMode::Auto,
            image_env_var: DEFAULT_IMAGE_ENV_VAR.to_string(),
            seven_zip: None,
            staging_dir: None,
            connect_timeout_secs: 30,
            manifest_timeout_secs: 30,
            protected_directories: PROTECTED_DIRECTORIES.iter().map(|s| s.to_string()).collect(),
            deprecated_extension: DEPRECATED_EXTENSION.to_string(),
            platform: None,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl UpdaterConfig {
    /// Default config location: `<config dir>/rpcs3-updater/updater.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rpcs3-updater").join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.manifest_url).map_err(|e| {
            ConfigError::Invalid(format!("manifest_url '{}': {}", self.manifest_url, e))
        })?;

        let ext = &self.deprecated_extension;
        if ext.is_empty() || ext.contains(['/', '\\']) || ext.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "deprecated_extension '{}' must be a bare, non-empty suffix",
                ext
            )));
        }

        if self.image_env_var.is_empty() {
            return Err(ConfigError::Invalid("image_env_var is empty".to_string()));
        }

        Ok(())
    }

    /// Installation root, defaulting to the running executable's directory
    pub fn resolve_install_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.install_root {
            return Ok(root.clone());
        }
        let exe = std::env::current_exe().map_err(ConfigError::InstallRoot)?;
        exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            ConfigError::InstallRoot(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no parent directory", exe.display()),
            ))
        })
    }

    /// 7-Zip executable: configured path, else bundled `7za.exe` on Windows, else `7za`
    pub fn seven_zip_path(&self, install_root: &Path) -> PathBuf {
        match &self.seven_zip {
            Some(path) => path.clone(),
            None if cfg!(windows) => install_root.join("7za.exe"),
            None => PathBuf::from("7za"),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config: UpdaterConfig = toml::from_str("").unwrap();
        assert_eq!(config, UpdaterConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_carry_protected_directories() {
        let config = UpdaterConfig::default();
        assert!(config.protected_directories.iter().any(|d| d == "dev_hdd0"));
        assert_eq!(config.deprecated_extension, "rpcs3-deprecated");
        assert_eq!(config.packaging, PackagingMode::Auto);
    }

    #[test]
    fn test_parse_overrides() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            install_root = "/opt/rpcs3"
            packaging = "image"
            platform = "linux"
            hash_algorithm = "xxh128"
            protected_directories = ["saves"]
            "#,
        )
        .unwrap();

        assert_eq!(config.install_root.as_deref(), Some(Path::new("/opt/rpcs3")));
        assert_eq!(config.packaging, PackagingMode::Image);
        assert_eq!(config.platform, Some(Platform::Linux));
        assert_eq!(config.hash_algorithm, HashAlgorithm::Xxh128);
        assert_eq!(config.protected_directories, vec!["saves".to_string()]);
        assert_eq!(
            config.resolve_install_root().unwrap(),
            PathBuf::from("/opt/rpcs3")
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updater.toml");
        fs::write(&path, "manifest_ulr = \"https://example.com\"\n").unwrap();

        assert!(matches!(
            UpdaterConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_extension_rejected() {
        let config = UpdaterConfig {
            deprecated_extension: "a/b".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = UpdaterConfig {
            staging_dir: Some(PathBuf::from("/var/tmp")),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        let parsed: UpdaterConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_seven_zip_override() {
        let config = UpdaterConfig {
            seven_zip: Some(PathBuf::from("/usr/bin/7z")),
            ..Default::default()
        };
        assert_eq!(
            config.seven_zip_path(Path::new("/opt/rpcs3")),
            PathBuf::from("/usr/bin/7z")
        );
    }
}
