//! Startup reconciliation of interrupted or deferred installs.
//!
//! Must run before the host loads any file under the install root. The
//! filesystem scan is the only state: there is no "already ran" flag, and a
//! run with nothing pending only reads the directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::cleanup::sweep_retired;
use crate::install::{clear_readonly, sentinel};
use crate::lock::AttemptLock;

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub retired_removed: usize,
    pub retired_remaining: usize,
    /// Live paths whose staged replacement was promoted
    pub promoted: Vec<PathBuf>,
    /// Staged files left in place for a later pass
    pub pending: Vec<PathBuf>,
    /// Another attempt held the root; nothing was touched
    pub locked: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        !self.locked && self.pending.is_empty() && self.retired_remaining == 0
    }
}

#[derive(Debug, Clone)]
pub struct StartupReconciler {
    root: PathBuf,
}

impl StartupReconciler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sweep retired files, then promote every staged file.
    ///
    /// Skipped entirely while an update attempt holds the root.
    pub fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !self.root.is_dir() {
            return report;
        }

        let _lock = match AttemptLock::try_acquire(&self.root) {
            Ok(Some(lock)) => Some(lock),
            Ok(None) => {
                warn!(
                    "Update in progress for {}, skipping reconciliation",
                    self.root.display()
                );
                report.locked = true;
                return report;
            }
            Err(e) => {
                warn!("Could not take update lock for {}: {}", self.root.display(), e);
                None
            }
        };

        let (removed, remaining) = sweep_retired(&self.root);
        report.retired_removed = removed;
        report.retired_remaining = remaining;

        let staged: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && sentinel::is_staged(e.path()))
            .map(|e| e.into_path())
            .collect();

        if staged.is_empty() {
            return report;
        }
        info!(
            "Found {} staged files under {}, promoting",
            staged.len(),
            self.root.display()
        );

        for staged_path in staged {
            let Some(live) = sentinel::live_path_for_staged(&staged_path) else {
                continue;
            };
            match promote(&staged_path, &live) {
                Ok(()) => {
                    debug!("Promoted {}", live.display());
                    report.promoted.push(live);
                }
                Err(e) => {
                    warn!("Could not promote {}: {} (will retry)", staged_path.display(), e);
                    report.pending.push(staged_path);
                }
            }
        }

        report
    }
}

fn promote(staged: &Path, live: &Path) -> std::io::Result<()> {
    if live.exists() {
        clear_readonly(live)?;
        fs::remove_file(live)?;
    }
    fs::rename(staged, live)
}
