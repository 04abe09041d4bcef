// src/filesystem/extract.rs

//! Build archive extraction
//!
//! Archives are always expanded into a fresh staging directory owned by the
//! current update attempt, never directly into the installation. Overwriting
//! inside that directory is therefore safe.
//!
//! Two implementations exist behind [`Extractor`]:
//! - [`SevenZipExtractor`] runs the external 7-Zip tool (`.7z`, `.zip`)
//! - [`TarballExtractor`] unpacks `.tar.gz`/`.tgz`/`.tar.xz` in-process

use super::staging_dir;
use flate2::read::GzDecoder;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

/// 7-Zip exit code for "warning, non-fatal"
const SEVEN_ZIP_WARNING: i32 = 1;

/// Extraction failures
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The external tool could not be started
    #[error("Failed to start extraction tool '{tool}': {source}")]
    LaunchFailed {
        tool: PathBuf,
        source: std::io::Error,
    },

    /// The external tool exited with a failure code, or was killed (`None`)
    #[error("Extraction tool exited abnormally ({})", describe_exit(.0))]
    AbnormalExit(Option<i32>),

    /// In-process extraction failed
    #[error("Failed to extract '{path}': {message}")]
    Archive { path: PathBuf, message: String },

    /// No extractor handles this file type
    #[error("Unsupported archive type: {0}")]
    UnsupportedArchive(PathBuf),

    /// Staging directory could not be created
    #[error("Failed to create extraction directory: {0}")]
    Staging(std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// A fully expanded build inside its owning staging directory
#[derive(Debug)]
pub struct ExtractedTree {
    scope: TempDir,
}

impl ExtractedTree {
    pub fn new(scope: TempDir) -> Self {
        Self { scope }
    }

    /// Root of the extracted build
    pub fn root(&self) -> &Path {
        self.scope.path()
    }
}

/// Expands a build archive into a private directory
pub trait Extractor: Send + Sync {
    fn extract(&self, archive: &Path) -> Result<ExtractedTree, ExtractError>;
}

/// Archive formats recognised by file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Handled by the 7-Zip tool
    SevenZip,
    TarGz,
    TarXz,
}

impl ArchiveKind {
    /// Detect from the archive's file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".7z") || name.ends_with(".zip") {
            Some(Self::SevenZip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else {
            None
        }
    }
}

/// Runs `7za x -aoa -o<dir> <archive>`
#[derive(Debug, Clone)]
pub struct SevenZipExtractor {
    tool: PathBuf,
    staging_parent: Option<PathBuf>,
}

impl SevenZipExtractor {
    pub fn new(tool: impl Into<PathBuf>, staging_parent: Option<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            staging_parent,
        }
    }
}

impl Extractor for SevenZipExtractor {
    fn extract(&self, archive: &Path) -> Result<ExtractedTree, ExtractError> {
        let scope = staging_dir("extract", self.staging_parent.as_deref())
            .map_err(ExtractError::Staging)?;

        let mut output_arg = OsString::from("-o");
        output_arg.push(scope.path());

        info!(
            "Extracting {} with {} into {}",
            archive.display(),
            self.tool.display(),
            scope.path().display()
        );

        let output = Command::new(&self.tool)
            .arg("x")
            .arg("-aoa")
            .arg(output_arg)
            .arg(archive)
            .output()
            .map_err(|source| ExtractError::LaunchFailed {
                tool: self.tool.clone(),
                source,
            })?;

        debug!("7-Zip stdout: {}", String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            debug!("7-Zip stderr: {}", String::from_utf8_lossy(&output.stderr));
        }

        match output.status.code() {
            Some(0) => {}
            Some(SEVEN_ZIP_WARNING) => {
                warn!("7-Zip reported non-fatal warnings for {}", archive.display());
            }
            code => return Err(ExtractError::AbnormalExit(code)),
        }

        Ok(ExtractedTree::new(scope))
    }
}

/// Unpacks compressed tarballs without external tools
#[derive(Debug, Clone, Default)]
pub struct TarballExtractor {
    staging_parent: Option<PathBuf>,
}

impl TarballExtractor {
    pub fn new(staging_parent: Option<PathBuf>) -> Self {
        Self { staging_parent }
    }

    fn open_archive(archive: &Path, kind: ArchiveKind) -> Result<Archive<Box<dyn Read>>, ExtractError> {
        let file = File::open(archive).map_err(|e| ExtractError::Archive {
            path: archive.to_path_buf(),
            message: e.to_string(),
        })?;
        let file = BufReader::new(file);

        let reader: Box<dyn Read> = match kind {
            ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveKind::TarXz => Box::new(XzDecoder::new(file)),
            ArchiveKind::SevenZip => {
                return Err(ExtractError::UnsupportedArchive(archive.to_path_buf()));
            }
        };

        Ok(Archive::new(reader))
    }
}

impl Extractor for TarballExtractor {
    fn extract(&self, archive: &Path) -> Result<ExtractedTree, ExtractError> {
        let kind = ArchiveKind::detect(archive)
            .ok_or_else(|| ExtractError::UnsupportedArchive(archive.to_path_buf()))?;
        let mut tar = Self::open_archive(archive, kind)?;

        let scope = staging_dir("extract", self.staging_parent.as_deref())
            .map_err(ExtractError::Staging)?;

        info!(
            "Unpacking {} into {}",
            archive.display(),
            scope.path().display()
        );

        tar.set_overwrite(true);
        tar.set_preserve_permissions(true);
        tar.unpack(scope.path()).map_err(|e| ExtractError::Archive {
            path: archive.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(ExtractedTree::new(scope))
    }
}

/// Picks the extractor by archive file name
#[derive(Debug, Clone)]
pub struct AutoExtractor {
    seven_zip: SevenZipExtractor,
    tarball: TarballExtractor,
}

impl AutoExtractor {
    pub fn new(seven_zip_tool: impl Into<PathBuf>, staging_parent: Option<PathBuf>) -> Self {
        Self {
            seven_zip: SevenZipExtractor::new(seven_zip_tool, staging_parent.clone()),
            tarball: TarballExtractor::new(staging_parent),
        }
    }
}

impl Extractor for AutoExtractor {
    fn extract(&self, archive: &Path) -> Result<ExtractedTree, ExtractError> {
        match ArchiveKind::detect(archive) {
            Some(ArchiveKind::SevenZip) => self.seven_zip.extract(archive),
            Some(ArchiveKind::TarGz | ArchiveKind::TarXz) => self.tarball.extract(archive),
            None => Err(ExtractError::UnsupportedArchive(archive.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(
            ArchiveKind::detect(Path::new("rpcs3-v0.0.30-win64.7z")),
            Some(ArchiveKind::SevenZip)
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("build.TAR.GZ")),
            Some(ArchiveKind::TarGz)
        );
        assert_eq!(
            ArchiveKind::detect(Path::new("build.tar.xz")),
            Some(ArchiveKind::TarXz)
        );
        assert_eq!(ArchiveKind::detect(Path::new("rpcs3.AppImage")), None);
    }

    #[test]
    fn test_tarball_extracts_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("build.tar.gz");
        write_tar_gz(
            &archive,
            &[("rpcs3.exe", b"binary"), ("GuiConfigs/default.ini", b"[ui]")],
        );

        let tree = TarballExtractor::new(Some(dir.path().to_path_buf()))
            .extract(&archive)
            .unwrap();

        assert_eq!(fs::read(tree.root().join("rpcs3.exe")).unwrap(), b"binary");
        assert_eq!(
            fs::read(tree.root().join("GuiConfigs/default.ini")).unwrap(),
            b"[ui]"
        );
    }

    #[test]
    fn test_extracted_tree_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("build.tgz");
        write_tar_gz(&archive, &[("a.txt", b"a")]);

        let tree = TarballExtractor::default().extract(&archive).unwrap();
        let root = tree.root().to_path_buf();
        assert!(root.exists());
        drop(tree);
        assert!(!root.exists());
    }

    #[test]
    fn test_corrupt_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        let err = TarballExtractor::default().extract(&archive).unwrap_err();
        assert!(matches!(err, ExtractError::Archive { .. }));
    }

    #[test]
    fn test_auto_rejects_unknown_type() {
        let err = AutoExtractor::new("7za", None)
            .extract(Path::new("/tmp/rpcs3.AppImage"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedArchive(_)));
    }

    #[test]
    fn test_missing_tool_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("build.7z");
        fs::write(&archive, b"7z").unwrap();

        let err = SevenZipExtractor::new(dir.path().join("no-such-7za"), None)
            .extract(&archive)
            .unwrap_err();
        assert!(matches!(err, ExtractError::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_abnormal_exit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-7za");
        fs::write(&tool, "#!/bin/sh\nexit 2\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let archive = dir.path().join("build.7z");
        fs::write(&archive, b"7z").unwrap();

        let err = SevenZipExtractor::new(&tool, None)
            .extract(&archive)
            .unwrap_err();
        assert!(matches!(err, ExtractError::AbnormalExit(Some(2))));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_receives_output_dir() {
        use std::os::unix::fs::PermissionsExt;

        // Fake tool that writes a marker into the -o directory
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-7za");
        fs::write(
            &tool,
            "#!/bin/sh\n[ \"$1\" = x ] && [ \"$2\" = -aoa ] || exit 7\nout=\"${3#-o}\"\necho extracted > \"$out/marker\"\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let archive = dir.path().join("build.7z");
        fs::write(&archive, b"7z").unwrap();

        let tree = SevenZipExtractor::new(&tool, None).extract(&archive).unwrap();
        assert_eq!(
            fs::read_to_string(tree.root().join("marker")).unwrap(),
            "extracted\n"
        );
    }
}
