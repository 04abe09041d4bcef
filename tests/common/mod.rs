// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use rpcs3_updater::filesystem::staging_dir;
use rpcs3_updater::{
    ArtifactSource, BuildInfo, CancelToken, DownloadedArtifact, FetchError, ManifestSource,
    ProgressTracker, UpdateEvent,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Write `(relative path, content)` pairs under `root`, creating parents
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Build a `.tar.gz` holding `files`
pub fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// All paths under `root` whose name ends with the marker suffix
pub fn marker_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".rpcs3-deprecated"))
        .map(|e| e.into_path())
        .collect()
}

pub fn build_info(download_url: &str) -> BuildInfo {
    BuildInfo {
        pull_request_label: "16000".to_string(),
        platform_datetime: "2024-06-01 12:00:00".to_string(),
        download_url: download_url.to_string(),
    }
}

/// Manifest source answering with a fixed build
pub struct FixedManifest(pub BuildInfo);

impl ManifestSource for FixedManifest {
    fn fetch_build_info(&self) -> Result<BuildInfo, FetchError> {
        Ok(self.0.clone())
    }
}

/// Manifest source that always fails with maintenance mode
pub struct MaintenanceManifest;

impl ManifestSource for MaintenanceManifest {
    fn fetch_build_info(&self) -> Result<BuildInfo, FetchError> {
        rpcs3_updater::remote::parse_manifest(
            br#"{"return_code": -2}"#,
            rpcs3_updater::Platform::Linux,
        )
    }
}

/// Staging directories handed out by a fake source, for cleanup checks
#[derive(Clone, Default)]
pub struct StagingLog(Arc<Mutex<Vec<PathBuf>>>);

impl StagingLog {
    pub fn record(&self, path: &Path) {
        self.0.lock().unwrap().push(path.to_path_buf());
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.0.lock().unwrap().clone()
    }
}

/// "Downloads" a local file by copying it into a fresh staging directory
pub struct LocalFileSource {
    pub file: PathBuf,
    pub staging: StagingLog,
}

impl ArtifactSource for LocalFileSource {
    fn download(
        &self,
        url: &str,
        progress: &dyn ProgressTracker,
        _cancel: &CancelToken,
    ) -> Result<DownloadedArtifact, FetchError> {
        let scope = staging_dir("test-download", None).map_err(|source| FetchError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        self.staging.record(scope.path());

        let name = url.rsplit('/').next().unwrap_or("artifact");
        let target = scope.path().join(name);
        let bytes = fs::copy(&self.file, &target).map_err(|source| FetchError::Io {
            path: target.clone(),
            source,
        })?;
        progress.set_length(bytes);
        progress.set_position(bytes);

        Ok(DownloadedArtifact::new(target, scope))
    }
}

/// Never finishes on its own; waits for cancellation
pub struct StalledSource {
    pub staging: StagingLog,
}

impl ArtifactSource for StalledSource {
    fn download(
        &self,
        _url: &str,
        progress: &dyn ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<DownloadedArtifact, FetchError> {
        let scope = staging_dir("test-download", None).map_err(|source| FetchError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        self.staging.record(scope.path());
        fs::write(scope.path().join("partial.7z"), b"half").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut received = 0;
        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            received += 1;
            progress.set_position(received);
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(FetchError::Transport("stalled source timed out".to_string()))
    }
}

/// Collects every event an updater emits
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<UpdateEvent>>>);

impl EventLog {
    pub fn callback(&self) -> impl Fn(UpdateEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.0);
        move |event| events.lock().unwrap().push(event)
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.0.lock().unwrap().clone()
    }
}

/// Completes the transfer, then holds the result until a cancel arrives
pub struct LateCancelSource {
    pub file: PathBuf,
    pub staging: StagingLog,
}

impl ArtifactSource for LateCancelSource {
    fn download(
        &self,
        url: &str,
        progress: &dyn ProgressTracker,
        cancel: &CancelToken,
    ) -> Result<DownloadedArtifact, FetchError> {
        let artifact = LocalFileSource {
            file: self.file.clone(),
            staging: self.staging.clone(),
        }
        .download(url, progress, &CancelToken::new())?;

        let deadline = Instant::now() + Duration::from_secs(10);
        while !cancel.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(artifact)
    }
}
