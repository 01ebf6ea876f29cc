//! Update attempt orchestration
//!
//! Drives one target through check, download, extract and install while
//! holding the per-root attempt lock, and always cleans up afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cleanup::{self, CleanupReport};
use crate::config::{RetryConfig, TargetConfig, UpdaterConfig};
use crate::download::{self, ArchiveKind};
use crate::error::{Result, UpdateError};
use crate::install::{
    self, FileInstaller, FileSwapper, IgnoreList, InstallPlan, InstallResult, NativeSwapper,
};
use crate::lock::AttemptLock;
use crate::progress::{Reporter, UpdateEvent, UpdatePhase};
use crate::reconcile::{ReconcileReport, StartupReconciler};
use crate::release::{self, FeedClient, ReleaseVersion, ResolvedUpdate};
use crate::state_machine::{AttemptState, StateMachine};

/// One updatable product. Immutable for the duration of an attempt.
#[derive(Debug, Clone)]
pub struct UpdateTarget {
    pub name: String,
    pub asset_keyword: String,
    pub install_root: PathBuf,
    pub current_version: ReleaseVersion,
    /// The package carries the complete install tree
    pub full_package: bool,
    /// Wrapper directory levels to strip after extraction
    pub strip_levels: usize,
    /// `owner/name` of the release feed
    pub repo: String,
}

impl UpdateTarget {
    pub fn from_config(cfg: &TargetConfig) -> Result<Self> {
        let current_version = ReleaseVersion::from_tag(&cfg.current_version)
            .ok_or_else(|| {
                UpdateError::Config(format!(
                    "target '{}' has an invalid current_version '{}'",
                    cfg.name, cfg.current_version
                ))
            })?
            .truncated(3);

        Ok(Self {
            name: cfg.name.clone(),
            asset_keyword: cfg.asset_keyword.clone(),
            install_root: cfg.install_root.clone(),
            current_version,
            full_package: cfg.full_package,
            strip_levels: cfg.strip_levels,
            repo: cfg.repo.clone(),
        })
    }

    /// Scratch working directory beside the install root: `<parent>/<name>.tmp`
    pub fn scratch_dir(&self) -> PathBuf {
        let parent = self
            .install_root
            .parent()
            .unwrap_or(self.install_root.as_path());
        parent.join(format!("{}.tmp", self.name))
    }
}

/// How a completed attempt ended
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    NoUpdate,
    AllApplied {
        version: ReleaseVersion,
        result: InstallResult,
    },
    /// Some files were staged; the host must restart to finish
    PartiallyDeferred {
        version: ReleaseVersion,
        result: InstallResult,
    },
}

impl AttemptOutcome {
    pub fn needs_restart(&self) -> bool {
        matches!(self, AttemptOutcome::PartiallyDeferred { .. })
    }
}

pub struct Updater {
    target: UpdateTarget,
    feed: FeedClient,
    swapper: Arc<dyn FileSwapper>,
    retry: RetryConfig,
    archive_extensions: Vec<String>,
    ignore_file: PathBuf,
    inactivity_timeout: Duration,
    allow_prerelease: bool,
}

impl Updater {
    pub fn new(config: &UpdaterConfig, target: UpdateTarget) -> Result<Self> {
        let feed = FeedClient::new(&config.api_base, &config.user_agent, config.request_timeout())?;
        Ok(Self {
            target,
            feed,
            swapper: Arc::new(NativeSwapper),
            retry: config.retry.clone(),
            archive_extensions: config.archive_extensions.clone(),
            ignore_file: PathBuf::from(&config.ignore_file),
            inactivity_timeout: config.inactivity_timeout(),
            allow_prerelease: config.allow_prerelease,
        })
    }

    /// Replace the filesystem primitives (platform-specific or test doubles)
    pub fn with_swapper(mut self, swapper: Arc<dyn FileSwapper>) -> Self {
        self.swapper = swapper;
        self
    }

    pub fn with_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = allow;
        self
    }

    pub fn target(&self) -> &UpdateTarget {
        &self.target
    }

    /// Look for a release newer than the running version.
    ///
    /// Feed failures are logged and reported as "no update"; a release with
    /// no matching asset is an error.
    pub async fn check(&self, reporter: &Reporter) -> Result<Option<ResolvedUpdate>> {
        reporter.info(format!("Checking for updates: {}", self.target.name));

        let releases = match self.feed.fetch_releases(&self.target.repo).await {
            Ok(releases) => releases,
            Err(e) => {
                reporter.warn(format!("Update check failed, assuming no update: {e}"));
                return Ok(None);
            }
        };

        let Some((release, version)) =
            release::select_latest(&releases, &self.target.current_version, self.allow_prerelease)
        else {
            reporter.info(format!(
                "Current version {} is up to date",
                self.target.current_version
            ));
            return Ok(None);
        };

        let asset = release::select_asset(release, &self.target.asset_keyword, &self.archive_extensions)?;

        reporter.info(format!("New version found: {} ({})", release.tag_name, asset.name));
        Ok(Some(ResolvedUpdate {
            release: release.clone(),
            version,
            asset: asset.clone(),
        }))
    }

    /// Run one full attempt. Cleanup runs whatever the result.
    pub async fn run(&self, reporter: &Reporter, cancel: &CancellationToken) -> Result<AttemptOutcome> {
        let _lock = AttemptLock::acquire(&self.target.install_root)?;
        let mut sm = StateMachine::default();

        let outcome = self.run_locked(&mut sm, reporter, cancel).await;

        if let Err(e) = &outcome {
            reporter.error(format!("Update failed: {e}"));
            if sm.fail() == AttemptState::Failed {
                reporter.final_state(AttemptState::Failed).await;
                if let Ok(idle) = sm.advance(AttemptState::Idle) {
                    reporter.final_state(idle).await;
                }
            }
        }

        // The lock is still held here, so skip the locking variant
        let (scratch, root) = (self.target.scratch_dir(), self.target.install_root.clone());
        let cleaned =
            install::run_blocking(move || Ok(cleanup::cleanup_attempt(&scratch, &root))).await;
        match cleaned {
            Ok(report) => debug!("Attempt cleanup: {report:?}"),
            Err(e) => reporter.warn(format!("Attempt cleanup failed: {e}")),
        }
        outcome
    }

    /// Run the attempt on a background task.
    pub fn spawn(
        self: Arc<Self>,
        reporter: Reporter,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<AttemptOutcome>> {
        tokio::spawn(async move { self.run(&reporter, &cancel).await })
    }

    /// Finish interrupted or deferred installs under the install root.
    pub fn reconcile(&self) -> ReconcileReport {
        StartupReconciler::new(&self.target.install_root).run()
    }

    /// Remove the scratch directory and sweep retired files between attempts.
    ///
    /// Fails with [`UpdateError::AttemptInProgress`] while an attempt runs.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        cleanup::cleanup_idle(&self.target.scratch_dir(), &self.target.install_root)
    }

    async fn run_locked(
        &self,
        sm: &mut StateMachine,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome> {
        reporter.state(sm.advance(AttemptState::CheckingForUpdate)?);
        reporter.progress(UpdatePhase::Checking, None);

        let Some(update) = self.check(reporter).await? else {
            reporter.final_state(sm.advance(AttemptState::NoUpdate)?).await;
            reporter.final_state(sm.advance(AttemptState::Idle)?).await;
            return Ok(AttemptOutcome::NoUpdate);
        };

        reporter.send(UpdateEvent::ReleaseNotes {
            tag: update.release.tag_name.clone(),
            body: update.release.body.clone().unwrap_or_default(),
        });

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        // Download
        reporter.state(sm.advance(AttemptState::Downloading)?);
        let kind = ArchiveKind::from_name(&update.asset.name).ok_or_else(|| {
            UpdateError::Archive(format!("unsupported package format: {}", update.asset.name))
        })?;
        let scratch = prepare_scratch(self.target.scratch_dir()).await?;
        let archive_path = scratch.join(format!("update{}", kind.extension()));

        reporter.info(format!("Downloading {}...", update.asset.name));
        download::download_to_file(
            self.feed.http(),
            &update.asset.browser_download_url,
            &archive_path,
            self.inactivity_timeout,
            reporter,
            cancel,
        )
        .await?;

        // Extract
        reporter.state(sm.advance(AttemptState::Extracting)?);
        reporter.info("Extracting...");
        reporter.progress(UpdatePhase::Extracting, None);
        let contents = download::extract_package(
            &archive_path,
            kind,
            &scratch.join("contents"),
            self.target.strip_levels,
        )
        .await?;
        let contents = install::run_blocking(move || {
            download::unblock_tree(&contents);
            Ok(contents)
        })
        .await?;

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        // Install
        reporter.state(sm.advance(AttemptState::Installing)?);
        reporter.info("Installing files...");
        let ignore_path = self.target.install_root.join(&self.ignore_file);
        let ignore = install::run_blocking(move || Ok(IgnoreList::load(&ignore_path))).await?;
        let installer = FileInstaller::new(Arc::clone(&self.swapper), self.retry.clone())
            .with_ignore_list(ignore)
            .with_backup(self.target.full_package);

        let plan = InstallPlan {
            source: contents,
            destination: self.target.install_root.clone(),
        };
        let result = installer.install(plan, reporter, cancel).await?;

        if !result.failed().is_empty() {
            reporter.warn(format!(
                "{} files could not be installed",
                result.failed().len()
            ));
        }
        reporter.progress(UpdatePhase::Complete, Some(1.0));

        if result.needs_restart() {
            reporter.final_state(sm.advance(AttemptState::PartiallyDeferred)?).await;
            let deferred = result
                .deferred()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>();
            reporter.warn(format!(
                "{} files are pending and will be applied on restart",
                deferred.len()
            ));
            reporter
                .send_critical(UpdateEvent::RestartRequested { deferred })
                .await;
            reporter.final_state(sm.advance(AttemptState::AwaitingRestart)?).await;
            Ok(AttemptOutcome::PartiallyDeferred {
                version: update.version,
                result,
            })
        } else {
            reporter.final_state(sm.advance(AttemptState::AllApplied)?).await;
            info!("{} updated to {}", self.target.name, update.version);
            reporter.final_state(sm.advance(AttemptState::Idle)?).await;
            Ok(AttemptOutcome::AllApplied {
                version: update.version,
                result,
            })
        }
    }

}

/// Fresh, empty scratch directory for this attempt
async fn prepare_scratch(scratch: PathBuf) -> Result<PathBuf> {
    install::run_blocking(move || {
        recreate_dir(&scratch)?;
        Ok(scratch)
    })
    .await
}

fn recreate_dir(dir: &Path) -> Result<()> {
    cleanup::remove_scratch(dir).map_err(|e| UpdateError::directory(dir, e))?;
    fs::create_dir_all(dir).map_err(|e| UpdateError::directory(dir, e))?;
    Ok(())
}

/// Run the reconciliation pass for every configured target.
pub fn reconcile_all(config: &UpdaterConfig) -> Vec<(String, ReconcileReport)> {
    config
        .targets
        .iter()
        .map(|t| {
            let report = StartupReconciler::new(t.install_root.clone()).run();
            (t.name.clone(), report)
        })
        .collect()
}
