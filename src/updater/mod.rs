// src/updater/mod.rs

//! Update orchestrator
//!
//! Sequences manifest check, download and installation for one attempt at
//! a time. Every long-running stage runs on a worker thread and reports
//! through the event callback; the caller is never blocked. Requests that
//! arrive while an attempt is running are rejected with
//! [`UpdateError::Busy`].
//!
//! Temporary directories (download, extraction) belong to the worker that
//! created them and are removed before the attempt reaches `Done`,
//! `Cancelled` or `Error`.

mod state;

pub use state::{Transition, UpdateState};

use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};
use crate::install::{InstallReport, InstallStrategy, PackagingMode, Stage, strategy_for};
use crate::progress::{CallbackProgress, ProgressEvent};
use crate::remote::{
    ArchiveFetcher, ArtifactSource, BuildInfo, CancelToken, FetchError, ManifestClient,
    ManifestSource,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Notifications emitted while an attempt runs
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    StateChanged(UpdateState),
    /// Manifest fetched; a download may now be requested
    BuildInfo(BuildInfo),
    /// Download progress; `total` is `None` when the size is unknown
    Progress { received: u64, total: Option<u64> },
    /// Non-fatal problem the user should know about
    Warning(String),
    Completed(InstallReport),
    Failed {
        message: String,
        manual_intervention: bool,
    },
}

type EventCallback = Box<dyn Fn(UpdateEvent) + Send + Sync>;

/// Mutable per-attempt state
#[derive(Default)]
struct Attempt {
    state: UpdateState,
    build_info: Option<BuildInfo>,
    last_error: Option<String>,
    cancel: CancelToken,
}

struct Inner {
    attempt: Mutex<Attempt>,
    manifest: Box<dyn ManifestSource>,
    artifacts: Box<dyn ArtifactSource>,
    strategy: Box<dyn InstallStrategy>,
    on_event: EventCallback,
}

/// Drives update attempts; cheap to clone and share between threads
#[derive(Clone)]
pub struct Updater {
    inner: Arc<Inner>,
}

impl Updater {
    pub fn new<F>(
        manifest: Box<dyn ManifestSource>,
        artifacts: Box<dyn ArtifactSource>,
        strategy: Box<dyn InstallStrategy>,
        on_event: F,
    ) -> Self
    where
        F: Fn(UpdateEvent) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                attempt: Mutex::new(Attempt::default()),
                manifest,
                artifacts,
                strategy,
                on_event: Box::new(on_event),
            }),
        }
    }

    /// Wire up the network clients and packaging strategy from configuration
    pub fn from_config<F>(config: &UpdaterConfig, install_root: &Path, on_event: F) -> Self
    where
        F: Fn(UpdateEvent) + Send + Sync + 'static,
    {
        Self::new(
            Box::new(ManifestClient::from_config(config)),
            Box::new(ArchiveFetcher::from_config(config)),
            strategy_for(config, install_root),
            on_event,
        )
    }

    pub fn state(&self) -> UpdateState {
        self.inner.attempt.lock().state
    }

    /// Build info from the most recent successful check
    pub fn build_info(&self) -> Option<BuildInfo> {
        self.inner.attempt.lock().build_info.clone()
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        self.inner.attempt.lock().last_error.clone()
    }

    pub fn packaging_mode(&self) -> PackagingMode {
        self.inner.strategy.mode()
    }

    /// Start a manifest check in the background
    pub fn check_for_update(&self) -> Result<JoinHandle<()>> {
        {
            let mut attempt = self.inner.attempt.lock();
            let next = self.inner.guard(&attempt, Transition::CheckRequested)?;
            attempt.state = next;
            attempt.build_info = None;
            attempt.last_error = None;
        }
        self.inner.emit(UpdateEvent::StateChanged(UpdateState::CheckingManifest));

        let inner = Arc::clone(&self.inner);
        self.spawn("rpcs3-update-check", move || inner.run_check())
    }

    /// Download and install the build from the last check
    pub fn download_latest(&self) -> Result<JoinHandle<()>> {
        let url = self
            .build_info()
            .map(|info| info.download_url)
            .ok_or(UpdateError::NoBuildInfo)?;
        self.download(&url)
    }

    /// Download `url` and install it in the background
    pub fn download(&self, url: &str) -> Result<JoinHandle<()>> {
        let cancel = {
            let mut attempt = self.inner.attempt.lock();
            let next = self.inner.guard(&attempt, Transition::DownloadRequested)?;
            attempt.state = next;
            attempt.cancel = CancelToken::new();
            attempt.cancel.clone()
        };
        self.inner.emit(UpdateEvent::StateChanged(UpdateState::Downloading));

        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        self.spawn("rpcs3-update-download", move || {
            inner.run_download(&url, &cancel)
        })
    }

    /// Cancel an in-flight download; returns false if nothing was cancelled
    ///
    /// Extraction and reconciliation cannot be interrupted.
    pub fn cancel(&self) -> bool {
        let attempt = self.inner.attempt.lock();
        if attempt.state != UpdateState::Downloading {
            debug!("Cancel ignored while {}", attempt.state);
            return false;
        }
        info!("Cancelling download");
        attempt.cancel.cancel();
        true
    }

    /// Decline the offered build and return to idle
    pub fn dismiss(&self) -> Result<()> {
        self.inner.advance(Transition::Dismissed)?;
        Ok(())
    }

    fn spawn<F>(&self, name: &str, work: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(work)
            .map_err(|e| {
                let message = format!("Failed to start worker thread: {e}");
                self.inner.fail(&UpdateError::Io(std::io::Error::other(message)));
                UpdateError::Io(e)
            })
    }
}

impl Inner {
    fn emit(&self, event: UpdateEvent) {
        (self.on_event)(event);
    }

    /// Validate `transition` against the current state
    fn guard(&self, attempt: &Attempt, transition: Transition) -> Result<UpdateState> {
        attempt.state.next(transition).ok_or_else(|| {
            if attempt.state.is_busy() {
                UpdateError::Busy(attempt.state)
            } else {
                UpdateError::InvalidTransition {
                    state: attempt.state,
                    transition,
                }
            }
        })
    }

    /// Apply `transition` and announce the new state
    fn advance(&self, transition: Transition) -> Result<UpdateState> {
        let next = {
            let mut attempt = self.attempt.lock();
            let next = self.guard(&attempt, transition)?;
            attempt.state = next;
            next
        };
        debug!("Update state -> {}", next);
        self.emit(UpdateEvent::StateChanged(next));
        Ok(next)
    }

    fn fail(&self, err: &UpdateError) {
        let message = err.to_string();
        let manual_intervention = err.requires_manual_intervention();
        if manual_intervention {
            error!("Update failed, installation needs manual repair: {}", message);
        } else {
            error!("Update failed: {}", message);
        }

        {
            let mut attempt = self.attempt.lock();
            attempt.last_error = Some(message.clone());
            match attempt.state.next(Transition::Failed) {
                Some(next) => attempt.state = next,
                None => {
                    warn!("Failure reported in terminal state {}", attempt.state);
                    return;
                }
            }
        }

        self.emit(UpdateEvent::StateChanged(UpdateState::Error));
        self.emit(UpdateEvent::Failed {
            message,
            manual_intervention,
        });
    }

    fn run_check(&self) {
        let info = match self.manifest.fetch_build_info() {
            Ok(info) => info,
            Err(e) => return self.fail(&e.into()),
        };

        {
            let mut attempt = self.attempt.lock();
            attempt.build_info = Some(info.clone());
        }
        if let Err(e) = self.advance(Transition::ManifestFetched) {
            return self.fail(&e);
        }
        self.emit(UpdateEvent::BuildInfo(info));
    }

    fn run_download(&self, url: &str, cancel: &CancelToken) {
        let progress = CallbackProgress::new(|event| {
            if let ProgressEvent::Position { current, total } = event {
                self.emit(UpdateEvent::Progress {
                    received: current,
                    total,
                });
            }
        });

        let artifact = match self.artifacts.download(url, &progress, cancel) {
            Ok(artifact) => artifact,
            Err(FetchError::Cancelled) => {
                info!("Download cancelled");
                if let Err(e) = self.advance(Transition::Cancelled) {
                    self.fail(&e);
                }
                return;
            }
            Err(e) => return self.fail(&e.into()),
        };

        // Leave Downloading under the lock so a cancel either lands before
        // this point and is honoured, or after it and is refused
        let finished = {
            let mut attempt = self.attempt.lock();
            if cancel.is_cancelled() {
                None
            } else {
                Some(self.guard(&attempt, Transition::DownloadFinished).map(|next| {
                    attempt.state = next;
                    next
                }))
            }
        };
        match finished {
            None => {
                info!("Download cancelled after the transfer completed");
                drop(artifact);
                if let Err(e) = self.advance(Transition::Cancelled) {
                    self.fail(&e);
                }
                return;
            }
            Some(Ok(next)) => {
                debug!("Update state -> {}", next);
                self.emit(UpdateEvent::StateChanged(next));
            }
            Some(Err(e)) => return self.fail(&e),
        }

        let on_stage = |stage: Stage| {
            let transition = match stage {
                Stage::Extracting => Transition::ExtractionStarted,
                Stage::Reconciling => Transition::ReconcileStarted,
                Stage::ReplacingImage => Transition::ImageReplaceStarted,
            };
            if let Err(e) = self.advance(transition) {
                warn!("Unexpected install stage {:?}: {}", stage, e);
            }
        };
        let result = self.strategy.install(&artifact, &on_stage);

        // Release staging before announcing the outcome
        drop(artifact);

        match result {
            Ok(report) => {
                if let InstallReport::Image(image) = &report
                    && !image.executable
                {
                    self.emit(UpdateEvent::Warning(format!(
                        "{} was updated but is not executable; fix its permissions manually",
                        image.image_path.display()
                    )));
                }
                if let Err(e) = self.advance(Transition::Completed) {
                    return self.fail(&e);
                }
                info!("Update installed");
                self.emit(UpdateEvent::Completed(report));
            }
            Err(e) => self.fail(&e),
        }
    }
}
