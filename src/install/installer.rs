//! Tiered file installer
//!
//! Every file of the scratch tree is installed independently:
//!
//! 1. hot swap (overwrite in place)
//! 2. atomic displace (rename the locked original to `.old`, copy new)
//! 3. deferred apply (stage as `.new` for the next start's reconciliation)
//!
//! Tiers 1–2 are retried with exponential backoff before tier 3 is tried.
//! One file's failure never aborts the batch.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::backup;
use super::ignore::IgnoreList;
use super::swap::{FileSwapper, SwapError};
use crate::config::RetryConfig;
use crate::error::{Result, UpdateError};
use crate::progress::{Reporter, UpdatePhase};

/// Resolved source tree and destination root, consumed by one install.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// How an applied file reached its live path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallTier {
    HotSwap,
    Displaced,
}

/// Result for one file, keyed by its path relative to the install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerFileOutcome {
    Applied { path: PathBuf, tier: InstallTier },
    Deferred { path: PathBuf },
    Failed { path: PathBuf, reason: String },
}

impl PerFileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            PerFileOutcome::Applied { path, .. }
            | PerFileOutcome::Deferred { path }
            | PerFileOutcome::Failed { path, .. } => path,
        }
    }
}

/// Aggregate of all per-file outcomes of one install.
///
/// Directory-level failures never produce an `InstallResult`; they surface
/// as [`UpdateError::Directory`] instead.
#[derive(Debug, Clone, Default)]
pub struct InstallResult {
    pub outcomes: Vec<PerFileOutcome>,
    pub skipped: Vec<PathBuf>,
}

impl InstallResult {
    pub fn deferred(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PerFileOutcome::Deferred { .. }))
            .map(PerFileOutcome::path)
            .collect()
    }

    pub fn failed(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PerFileOutcome::Failed { .. }))
            .map(PerFileOutcome::path)
            .collect()
    }

    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PerFileOutcome::Applied { .. }))
            .count()
    }

    /// Any deferred file means a restart is needed to finish the update
    pub fn needs_restart(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, PerFileOutcome::Deferred { .. }))
    }
}

pub struct FileInstaller {
    swapper: Arc<dyn FileSwapper>,
    retry: RetryConfig,
    ignore: IgnoreList,
    backup: bool,
}

impl FileInstaller {
    pub fn new(swapper: Arc<dyn FileSwapper>, retry: RetryConfig) -> Self {
        Self {
            swapper,
            retry,
            ignore: IgnoreList::default(),
            backup: false,
        }
    }

    pub fn with_ignore_list(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }

    /// Copy the top-level files of the root into `backup/` before installing
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup = enabled;
        self
    }

    pub async fn install(
        &self,
        plan: InstallPlan,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<InstallResult> {
        let InstallPlan {
            source,
            destination,
        } = plan;

        let prepared = {
            let (source, destination, backup) = (source.clone(), destination.clone(), self.backup);
            super::run_blocking(move || prepare_tree(&source, &destination, backup)).await?
        };
        if let Some(Err(e)) = &prepared.backup {
            reporter.warn(format!("Backup failed (continuing): {e}"));
        }
        let files = prepared.files;

        let total = files.len().max(1);
        let mut result = InstallResult::default();

        for (done, relative) in files.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }

            if self.ignore.is_ignored(&relative) {
                debug!("Ignored by ignore list: {}", relative.display());
                result.skipped.push(relative);
            } else {
                let outcome = self
                    .install_file(&source, &destination, relative, reporter, cancel)
                    .await?;
                result.outcomes.push(outcome);
            }

            reporter.progress(UpdatePhase::Installing, Some((done + 1) as f32 / total as f32));
        }

        info!(
            "Installed into {}: {} applied, {} deferred, {} failed, {} ignored",
            destination.display(),
            result.applied_count(),
            result.deferred().len(),
            result.failed().len(),
            result.skipped.len()
        );
        Ok(result)
    }

    /// Install one file. Only cancellation is returned as an error.
    async fn install_file(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: PathBuf,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<PerFileOutcome> {
        let src = source_root.join(&relative);
        let dest = dest_root.join(&relative);

        if let Some(parent) = dest.parent().map(Path::to_path_buf) {
            let created = super::run_blocking(move || Ok(fs::create_dir_all(parent))).await?;
            if let Err(e) = created {
                reporter.error(format!("Copy failed {}: {}", relative.display(), e));
                return Ok(PerFileOutcome::Failed {
                    path: relative,
                    reason: e.to_string(),
                });
            }
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<SwapError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.backoff(attempt - 1, cancel).await?;
            }

            let hot = {
                let (src, dest) = (src.clone(), dest.clone());
                self.blocking(move |s| s.try_hot_swap(&src, &dest)).await
            };

            match hot {
                Ok(()) => {
                    debug!("Hot swapped {}", relative.display());
                    return Ok(PerFileOutcome::Applied {
                        path: relative,
                        tier: InstallTier::HotSwap,
                    });
                }
                Err(SwapError::Locked(e)) => {
                    debug!(
                        "{} is in use ({}), displacing",
                        relative.display(),
                        super::platform::describe(&e)
                    );
                    let displaced = {
                        let (src, dest) = (src.clone(), dest.clone());
                        self.blocking(move |s| s.try_atomic_displace(&src, &dest)).await
                    };
                    match displaced {
                        Ok(retired) => {
                            if let Err(e) = self.swapper.schedule_delete_on_reboot(&retired) {
                                debug!(
                                    "Reboot deletion unavailable for {}: {}",
                                    retired.display(),
                                    e
                                );
                            }
                            debug!("Displaced {}", relative.display());
                            return Ok(PerFileOutcome::Applied {
                                path: relative,
                                tier: InstallTier::Displaced,
                            });
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(e) => last_error = Some(e),
            }

            if let Some(e) = &last_error {
                debug!(
                    "Attempt {}/{} for {} failed: {}",
                    attempt,
                    attempts,
                    relative.display(),
                    e
                );
            }
        }

        let staged = {
            let (src, dest) = (src.clone(), dest.clone());
            self.blocking(move |s| s.stage_deferred(&src, &dest)).await
        };

        match staged {
            Ok(_) => {
                reporter.warn(format!("[Pending] {}", relative.display()));
                Ok(PerFileOutcome::Deferred { path: relative })
            }
            Err(stage_error) => {
                let reason = match last_error {
                    Some(e) => format!("{e}; staging failed: {stage_error}"),
                    None => format!("staging failed: {stage_error}"),
                };
                reporter.error(format!("Copy failed {}: {}", relative.display(), reason));
                Ok(PerFileOutcome::Failed {
                    path: relative,
                    reason,
                })
            }
        }
    }

    /// Run a swapper call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, SwapError>
    where
        F: FnOnce(&dyn FileSwapper) -> Result<T, SwapError> + Send + 'static,
        T: Send + 'static,
    {
        let swapper = Arc::clone(&self.swapper);
        tokio::task::spawn_blocking(move || f(swapper.as_ref()))
            .await
            .map_err(|e| SwapError::Io(io::Error::other(e.to_string())))?
    }

    async fn backoff(&self, retry: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = self.retry.delay_for(retry);
        tokio::select! {
            _ = cancel.cancelled() => Err(UpdateError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

struct PreparedTree {
    files: Vec<PathBuf>,
    /// `None` when no backup was requested
    backup: Option<io::Result<usize>>,
}

/// Validate both roots, list the source files and take the optional backup.
fn prepare_tree(source: &Path, destination: &Path, take_backup: bool) -> Result<PreparedTree> {
    if !source.is_dir() {
        return Err(UpdateError::directory(source, "scratch source tree is missing"));
    }
    fs::create_dir_all(destination)
        .and_then(|_| fs::read_dir(destination).map(drop))
        .map_err(|e| UpdateError::directory(destination, e))?;

    let files = collect_files(source)?;

    let backed_up = take_backup.then(|| backup::backup_top_level(destination));
    if let Some(Ok(n)) = &backed_up {
        debug!("Backed up {} files to {}", n, backup::BACKUP_DIR);
    }
    Ok(PreparedTree {
        files,
        backup: backed_up,
    })
}

/// Relative paths of all regular files under `root`, in a stable order
fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| UpdateError::directory(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().strip_prefix(root) {
            Ok(relative) => files.push(relative.to_path_buf()),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    Ok(files)
}
