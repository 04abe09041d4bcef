// src/remote/download.rs

//! Build artifact download
//!
//! Every attempt gets a fresh private staging directory. The downloaded
//! file lives inside it and is named after the URL's last path segment.
//! Dropping the returned [`DownloadedArtifact`] deletes the directory, so
//! the artifact never outlives the attempt that fetched it.

use super::FetchError;
use super::client::{UpdateClient, ensure_secure, stream_to_writer};
use crate::config::UpdaterConfig;
use crate::filesystem::staging_dir;
use crate::progress::ProgressTracker;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};
use url::Url;

/// Cooperative cancellation flag shared between a caller and a transfer
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fetched archive or image inside its owning staging directory
#[derive(Debug)]
pub struct DownloadedArtifact {
    local_path: PathBuf,
    scope: TempDir,
}

impl DownloadedArtifact {
    /// Wrap a file that lives inside `scope`
    pub fn new(local_path: PathBuf, scope: TempDir) -> Self {
        Self { local_path, scope }
    }

    /// Path of the downloaded file
    pub fn path(&self) -> &Path {
        &self.local_path
    }

    /// Staging directory that owns the file
    pub fn scope_path(&self) -> &Path {
        self.scope.path()
    }

    /// File name of the artifact
    pub fn file_name(&self) -> &str {
        self.local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Anything that can fetch a build artifact
///
/// The orchestrator only depends on this trait, which keeps its tests off
/// the network.
pub trait ArtifactSource: Send + Sync {
    fn download(
        &self,
        url: &str,
        progress: &dyn ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<DownloadedArtifact, FetchError>;
}

/// Downloads build artifacts over HTTPS
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    connect_timeout: Duration,
    staging_parent: Option<PathBuf>,
}

impl ArchiveFetcher {
    pub fn new(connect_timeout: Duration, staging_parent: Option<PathBuf>) -> Self {
        Self {
            connect_timeout,
            staging_parent,
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.connect_timeout(), config.staging_dir.clone())
    }
}

impl ArtifactSource for ArchiveFetcher {
    fn download(
        &self,
        url: &str,
        progress: &dyn ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<DownloadedArtifact, FetchError> {
        // Downloads can take minutes, so only the connect phase is bounded
        let client = UpdateClient::new(self.connect_timeout, None)?;

        let parsed = ensure_secure(url)?;
        let file_name = file_name_from_url(&parsed)?;

        let scope = staging_dir("download", self.staging_parent.as_deref())
            .map_err(|e| FetchError::io(std::env::temp_dir(), e))?;
        let local_path = scope.path().join(&file_name);

        info!("Downloading {} to {}", url, local_path.display());
        progress.set_message(&format!("Downloading {file_name}"));

        let response = client.get(parsed.as_str())?;
        let total = response.content_length().unwrap_or(0);
        progress.set_length(total);

        let file = File::create(&local_path).map_err(|e| FetchError::io(&local_path, e))?;
        let mut writer = BufWriter::new(file);

        let received = match stream_to_writer(response, &mut writer, progress, cancel) {
            Ok(received) => received,
            Err(e) => {
                progress.finish_with_error(&e.to_string());
                return Err(e);
            }
        };

        let file = writer
            .into_inner()
            .map_err(|e| FetchError::io(&local_path, e.into_error()))?;
        file.sync_all().map_err(|e| FetchError::io(&local_path, e))?;

        progress.finish_with_message(&format!("{file_name} [done]"));
        info!("Downloaded {} bytes", received);
        debug!("Artifact staged in {}", scope.path().display());

        Ok(DownloadedArtifact::new(local_path, scope))
    }
}

/// Destination file name: the URL's last non-empty path segment, decoded
pub fn file_name_from_url(url: &Url) -> Result<String, FetchError> {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .ok_or_else(|| FetchError::Malformed(format!("no file name in download URL {url}")))?;
    let name = urlencoding::decode(segment).map_err(|e| {
        FetchError::Malformed(format!("undecodable file name '{segment}' in {url}: {e}"))
    })?;

    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(FetchError::Malformed(format!(
            "unusable file name '{name}' in download URL {url}"
        )));
    }

    Ok(name.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_file_name_from_last_segment() {
        let name = file_name_from_url(&url(
            "https://github.com/RPCS3/rpcs3-binaries-linux/releases/download/build-1/rpcs3-v0.0.5.AppImage",
        ))
        .unwrap();
        assert_eq!(name, "rpcs3-v0.0.5.AppImage");
    }

    #[test]
    fn test_file_name_ignores_query_and_trailing_slash() {
        assert_eq!(
            file_name_from_url(&url("https://example.com/builds/rpcs3.7z?token=1")).unwrap(),
            "rpcs3.7z"
        );
        assert_eq!(
            file_name_from_url(&url("https://example.com/builds/rpcs3.7z/")).unwrap(),
            "rpcs3.7z"
        );
    }

    #[test]
    fn test_file_name_percent_decoded() {
        assert_eq!(
            file_name_from_url(&url("https://example.com/builds/rpcs3%20build.7z")).unwrap(),
            "rpcs3 build.7z"
        );
        assert!(matches!(
            file_name_from_url(&url("https://example.com/builds/..%2Fevil.7z")),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            file_name_from_url(&url("https://example.com/builds/%2E%2E")),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_file_name_missing() {
        assert!(matches!(
            file_name_from_url(&url("https://example.com/")),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_insecure_download_url_rejected() {
        let fetcher = ArchiveFetcher::new(Duration::from_secs(5), None);
        let err = fetcher
            .download(
                "http://example.com/rpcs3.7z",
                &SilentProgress::new(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, FetchError::InsecureUrl(_)));
    }

    #[test]
    fn test_artifact_scope_removed_on_drop() {
        let scope = staging_dir("test", None).unwrap();
        let path = scope.path().join("build.tar.gz");
        std::fs::write(&path, b"bytes").unwrap();
        let scope_path = scope.path().to_path_buf();

        let artifact = DownloadedArtifact::new(path, scope);
        assert_eq!(artifact.file_name(), "build.tar.gz");
        drop(artifact);

        assert!(!scope_path.exists());
    }
}
