// src/lib.rs

//! RPCS3 self-update engine
//!
//! Checks the remote build manifest, downloads the latest build and brings
//! the local installation up to date without ever leaving it half-written.
//!
//! # Architecture
//!
//! - Content-addressed: files are replaced only when their digest changes
//! - Rename-aside: superseded files get a marker suffix and are swept on
//!   the next start instead of being deleted mid-update
//! - Strategy per packaging: a directory of loose files is reconciled,
//!   a single-file image is replaced as a unit
//! - One attempt at a time, driven by an explicit state machine on worker
//!   threads

pub mod config;
mod error;
pub mod filesystem;
pub mod hash;
pub mod install;
pub mod progress;
pub mod remote;
pub mod updater;

pub use config::{ConfigError, UpdaterConfig};
pub use error::{Result, UpdateError};
pub use filesystem::{
    ExtractError, ExtractedTree, Extractor, ImageReplacer, ImageReport, ReconcileError,
    ReconcileReport, Reconciler, ReplaceError, SweepReport, Sweeper,
};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use install::{InstallReport, InstallStrategy, PackagingMode, Stage, strategy_for};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use remote::{
    ArtifactSource, BuildInfo, CancelToken, DownloadedArtifact, FetchError, ManifestClient,
    ManifestSource, Platform,
};
pub use updater::{Transition, UpdateEvent, UpdateState, Updater};
