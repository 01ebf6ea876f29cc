//! Error taxonomy for update attempts.

use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::AttemptState;

/// Top-level failure of an update attempt or one of its steps.
///
/// Per-file install failures never show up here; they are recorded as
/// [`crate::install::PerFileOutcome::Failed`] and the batch continues.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Release feed or asset download failed (transport, HTTP status, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Corrupt or unsupported package
    #[error("archive error: {0}")]
    Archive(String),

    /// No release asset matched the target keyword and accepted extensions
    #[error("no asset matching '{keyword}' found in release {tag}")]
    AssetNotFound { keyword: String, tag: String },

    /// Missing scratch source or an install root that cannot be created or read
    #[error("directory error at {}: {reason}", .path.display())]
    Directory { path: PathBuf, reason: String },

    /// Another attempt already holds the lock for this install root
    #[error("an update attempt is already running for {}", .0.display())]
    AttemptInProgress(PathBuf),

    #[error("update attempt cancelled")]
    Cancelled,

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition { from: AttemptState, to: AttemptState },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    pub(crate) fn directory(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Directory {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        UpdateError::Network(e.to_string())
    }
}

pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
