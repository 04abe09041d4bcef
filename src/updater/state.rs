// src/updater/state.rs

//! Update attempt state machine
//!
//! ```text
//! Idle -> CheckingManifest -> ManifestReady -> Downloading -> Downloaded
//!   Downloaded -> Extracting -> Reconciling -> Done      (directory mode)
//!   Downloaded -> ReplacingImage -> Done                 (image mode)
//!   Downloading -> Cancelled
//!   <any non-terminal> -> Error
//! ```
//!
//! `Done`, `Cancelled` and `Error` end an attempt; a new check may start
//! from any of them. `ManifestReady` can be dismissed back to `Idle`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    CheckingManifest,
    ManifestReady,
    Downloading,
    Downloaded,
    Extracting,
    Reconciling,
    ReplacingImage,
    Done,
    Cancelled,
    Error,
}

/// Events that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CheckRequested,
    ManifestFetched,
    DownloadRequested,
    Dismissed,
    DownloadFinished,
    Cancelled,
    ExtractionStarted,
    ReconcileStarted,
    ImageReplaceStarted,
    Completed,
    Failed,
}

impl UpdateState {
    /// Attempt has ended (successfully or not)
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Error)
    }

    /// No attempt is running
    pub fn is_idle(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }

    /// A worker thread owns the attempt right now
    pub fn is_busy(self) -> bool {
        !self.is_idle() && self != Self::ManifestReady
    }

    /// State after `transition`, or `None` if it is not allowed here
    pub fn next(self, transition: Transition) -> Option<Self> {
        use Transition as T;
        use UpdateState as S;

        let next = match (self, transition) {
            (s, T::CheckRequested) if s.is_idle() => S::CheckingManifest,
            (S::CheckingManifest, T::ManifestFetched) => S::ManifestReady,
            (S::ManifestReady, T::DownloadRequested) => S::Downloading,
            (S::ManifestReady, T::Dismissed) => S::Idle,
            (S::Downloading, T::DownloadFinished) => S::Downloaded,
            (S::Downloading, T::Cancelled) => S::Cancelled,
            (S::Downloaded, T::ExtractionStarted) => S::Extracting,
            (S::Extracting, T::ReconcileStarted) => S::Reconciling,
            (S::Downloaded, T::ImageReplaceStarted) => S::ReplacingImage,
            (S::Reconciling | S::ReplacingImage, T::Completed) => S::Done,
            (s, T::Failed) if !s.is_terminal() => S::Error,
            _ => return None,
        };
        Some(next)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CheckingManifest => "checking manifest",
            Self::ManifestReady => "manifest ready",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Extracting => "extracting",
            Self::Reconciling => "reconciling",
            Self::ReplacingImage => "replacing image",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
