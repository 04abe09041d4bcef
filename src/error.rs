// src/error.rs
//! Crate-level error type for update attempts

use crate::config::ConfigError;
use crate::filesystem::{ExtractError, ReconcileError, ReplaceError};
use crate::remote::FetchError;
use crate::updater::{Transition, UpdateState};
use thiserror::Error;

/// Result type for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Anything that can end an update attempt
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another attempt is already running
    #[error("an update is already in progress ({0})")]
    Busy(UpdateState),

    /// Request not valid in the current state
    #[error("cannot apply {transition:?} while {state}")]
    InvalidTransition {
        state: UpdateState,
        transition: Transition,
    },

    /// Download requested before a manifest was fetched
    #[error("no build information available; check for updates first")]
    NoBuildInfo,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// True when the installation may be left broken and needs a human
    ///
    /// Only a failed image move or a failed file swap qualifies; every other
    /// failure leaves the installation as it was.
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(
            self,
            Self::Replace(ReplaceError::MoveFailed { .. })
                | Self::Reconcile(ReconcileError::FileSwapFailed { .. })
        )
    }
}
