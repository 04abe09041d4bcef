// src/remote/mod.rs

//! Network side of the updater
//!
//! - `client`: HTTPS-only client with a "no less-safe redirect" policy
//! - `manifest`: fetches and parses the remote build manifest
//! - `download`: streams a build artifact into a private staging directory

mod client;
mod download;
mod manifest;

use std::path::PathBuf;
use thiserror::Error;

pub use client::{UpdateClient, ensure_secure, is_less_safe_redirect};
pub use download::{
    ArchiveFetcher, ArtifactSource, CancelToken, DownloadedArtifact, file_name_from_url,
};
pub use manifest::{
    BuildInfo, MAINTENANCE_MODE, ManifestClient, ManifestSource, NO_UPDATE_INFO, Platform,
    ServerErrorCause, parse_manifest,
};

/// Errors from the manifest client and the archive fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    /// No secure transport could be set up; checked before any request
    #[error("Secure transport unavailable: {0}. Please make sure your system supports TLS")]
    TransportUnavailable(String),

    /// URL does not use https
    #[error("Refusing insecure URL: {0}")]
    InsecureUrl(String),

    /// Network or HTTP failure, carrying the transport's own message
    #[error("{0}")]
    Transport(String),

    /// Manifest has no `return_code`
    #[error("Server response has no return code")]
    MissingStatus,

    /// Manifest reported an error code
    #[error("{cause} (return code {code})")]
    Server { code: i64, cause: ServerErrorCause },

    /// Manifest could not be understood
    #[error("Malformed server response: {0}")]
    Malformed(String),

    /// Manifest carries no `latest_build`
    #[error("No latest build found")]
    NoBuildAvailable,

    /// Manifest has no build for this platform
    #[error("No build available for platform '{0}'")]
    PlatformNotSupported(String),

    /// Download aborted by the user
    #[error("Download cancelled")]
    Cancelled,

    /// Local I/O while staging a download
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
