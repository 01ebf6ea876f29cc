//! Scratch directory removal and the retired-file sweep
//!
//! Staged `.new` files are never touched here; only the reconciliation pass
//! may promote or remove them. Partial `.liveswap-*` copies are only ever
//! swept while the attempt lock is held, so no live copy can be in flight.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, UpdateError};
use crate::install::{clear_readonly, sentinel};
use crate::lock::AttemptLock;

/// What one cleanup run removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub scratch_removed: bool,
    pub retired_removed: usize,
    pub retired_remaining: usize,
}

/// Delete every `*.old` file and leftover `.liveswap-*` partial copy under
/// `root`, ignoring failures.
///
/// Returns `(removed, remaining)`. Files that cannot be deleted now are
/// retried on the next sweep. A missing root is a no-op.
pub fn sweep_retired(root: &Path) -> (usize, usize) {
    if !root.is_dir() {
        return (0, 0);
    }

    let mut removed = 0;
    let mut remaining = 0;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file()
            || !(sentinel::is_retired(path) || sentinel::is_partial(path))
        {
            continue;
        }
        let _ = clear_readonly(entry.path());
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Removed retired file {}", entry.path().display());
                removed += 1;
            }
            Err(e) => {
                debug!("Retired file {} still in use: {}", entry.path().display(), e);
                remaining += 1;
            }
        }
    }
    (removed, remaining)
}

/// Delete the scratch working directory of an attempt.
pub fn remove_scratch(scratch: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(scratch) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Cleanup outside of an attempt.
///
/// Takes the attempt lock first; fails with
/// [`UpdateError::AttemptInProgress`] while an attempt owns the root.
pub fn cleanup_idle(scratch: &Path, root: &Path) -> Result<CleanupReport> {
    let Some(_lock) = AttemptLock::try_acquire(root)? else {
        return Err(UpdateError::AttemptInProgress(root.to_path_buf()));
    };
    Ok(cleanup_attempt(scratch, root))
}

/// Remove the scratch directory and sweep retired files under `root`.
///
/// The caller must hold the attempt lock for `root`.
pub fn cleanup_attempt(scratch: &Path, root: &Path) -> CleanupReport {
    let scratch_removed = match remove_scratch(scratch) {
        Ok(removed) => removed,
        Err(e) => {
            warn!("Failed to remove scratch directory {}: {}", scratch.display(), e);
            false
        }
    };
    let (retired_removed, retired_remaining) = sweep_retired(root);

    CleanupReport {
        scratch_removed,
        retired_removed,
        retired_remaining,
    }
}
