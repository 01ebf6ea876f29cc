mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use liveswap::{
    AttemptOutcome, ReconcileReport, Reporter, TargetConfig, UpdateError, UpdateEvent,
    UpdatePhase, UpdateTarget, Updater, UpdaterConfig, reconcile_all,
};

/// Exit code when a restart is needed to finish an update
const EXIT_RESTART_REQUIRED: i32 = 2;
/// Exit code of `check` when an update is available
const EXIT_UPDATE_AVAILABLE: i32 = 3;

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main() -> Result<i32> {
    let args = cli::Args::parse();

    let cfg_path = match args.config {
        Some(path) => path,
        None => UpdaterConfig::default_path()?,
    };
    let cfg = UpdaterConfig::load_or_create(&cfg_path)
        .with_context(|| format!("Failed to load config {}", cfg_path.display()))?;
    info!("Using config from: {}", cfg_path.display());

    // Finish pending installs before anything else touches the install roots
    let reports = reconcile_all(&cfg);
    for (name, report) in &reports {
        log_reconcile(name, report);
    }

    match args.sub {
        cli::Cmd::Check { target, prerelease } => handle_check(&cfg, target, prerelease).await,
        cli::Cmd::Update { target, prerelease } => handle_update(&cfg, target, prerelease).await,
        cli::Cmd::Reconcile => Ok(handle_reconcile(&reports)),
        cli::Cmd::Cleanup { target } => handle_cleanup(&cfg, target),
    }
}

fn selected_targets<'a>(cfg: &'a UpdaterConfig, name: Option<&str>) -> Result<Vec<&'a TargetConfig>> {
    match name {
        Some(name) => match cfg.target(name) {
            Some(t) => Ok(vec![t]),
            None => bail!("No target named '{name}' in config"),
        },
        None => {
            if cfg.targets.is_empty() {
                warn!("No targets configured");
            }
            Ok(cfg.targets.iter().collect())
        }
    }
}

fn log_reconcile(name: &str, report: &ReconcileReport) {
    if !report.promoted.is_empty() {
        info!("{name}: applied {} pending files", report.promoted.len());
    }
    if !report.pending.is_empty() {
        warn!("{name}: {} staged files are still pending", report.pending.len());
    }
    if report.locked {
        info!("{name}: update in progress, reconciliation deferred");
    }
    if report.retired_remaining > 0 {
        debug!("{name}: {} retired files still in use", report.retired_remaining);
    }
}

/// Handle check command - report available updates without installing
async fn handle_check(cfg: &UpdaterConfig, target: Option<String>, prerelease: bool) -> Result<i32> {
    let mut available = false;
    for t in selected_targets(cfg, target.as_deref())? {
        let updater = Updater::new(cfg, UpdateTarget::from_config(t)?)?
            .with_prerelease(prerelease || cfg.allow_prerelease);

        match updater.check(&Reporter::silent()).await? {
            Some(update) => {
                available = true;
                println!(
                    "{}: {} -> {} ({})",
                    t.name,
                    updater.target().current_version,
                    update.version,
                    update.asset.name
                );
            }
            None => println!("{}: up to date ({})", t.name, updater.target().current_version),
        }
    }
    Ok(if available { EXIT_UPDATE_AVAILABLE } else { 0 })
}

/// Handle update command - run one attempt per target with a progress bar
async fn handle_update(cfg: &UpdaterConfig, target: Option<String>, prerelease: bool) -> Result<i32> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling update");
                cancel.cancel();
            }
        })
    };

    let mut restart_required = false;
    for t in selected_targets(cfg, target.as_deref())? {
        let updater = Updater::new(cfg, UpdateTarget::from_config(t)?)?
            .with_prerelease(prerelease || cfg.allow_prerelease);

        let (tx, rx) = mpsc::channel::<UpdateEvent>(100);
        let progress_task = tokio::spawn(render_progress(t.name.clone(), rx));

        let handle = Arc::new(updater).spawn(Reporter::new(tx), cancel.clone());
        let outcome = handle.await.context("Update task panicked")?;
        let _ = progress_task.await;

        match outcome.with_context(|| format!("Update of {} failed", t.name))? {
            AttemptOutcome::NoUpdate => println!("{}: up to date", t.name),
            AttemptOutcome::AllApplied { version, result } => println!(
                "{}: updated to {} ({} files, {} failed)",
                t.name,
                version,
                result.applied_count(),
                result.failed().len()
            ),
            AttemptOutcome::PartiallyDeferred { version, result } => {
                restart_required = true;
                println!(
                    "{}: updated to {}, restart required to apply {} pending files",
                    t.name,
                    version,
                    result.deferred().len()
                );
            }
        }
    }

    ctrl_c.abort();
    Ok(if restart_required { EXIT_RESTART_REQUIRED } else { 0 })
}

/// Drive a terminal progress bar from attempt events until the channel closes
async fn render_progress(name: String, mut rx: mpsc::Receiver<UpdateEvent>) {
    let pb = ProgressBar::new(100);
    match ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos:>3}%  {msg}") {
        Ok(style) => pb.set_style(style.progress_chars("█▓░")),
        Err(e) => debug!("Invalid progress bar template: {e}"),
    }

    while let Some(event) = rx.recv().await {
        match event {
            UpdateEvent::Progress { phase, fraction } => {
                let label = match phase {
                    UpdatePhase::Checking => "Checking",
                    UpdatePhase::Downloading => "Downloading",
                    UpdatePhase::Extracting => "Extracting",
                    UpdatePhase::Installing => "Installing",
                    UpdatePhase::Complete => "Done",
                };
                match fraction {
                    Some(f) => {
                        pb.set_position((f * 100.0) as u64);
                        pb.set_message(format!("{name}: {label}"));
                    }
                    None => pb.set_message(format!("{name}: {label}...")),
                }
            }
            UpdateEvent::ReleaseNotes { tag, body } if !body.trim().is_empty() => {
                pb.println(format!("Release notes for {tag}:\n{}", body.trim()));
            }
            UpdateEvent::RestartRequested { deferred } => {
                for path in deferred {
                    pb.println(format!("  pending: {path}"));
                }
            }
            UpdateEvent::StateChanged(state) => debug!("{name}: {state:?}"),
            UpdateEvent::Log { .. } | UpdateEvent::ReleaseNotes { .. } => {}
        }
    }
    pb.finish_and_clear();
}

/// Handle reconcile command - report what the startup pass left behind
fn handle_reconcile(reports: &[(String, ReconcileReport)]) -> i32 {
    let mut pending = false;
    for (name, report) in reports {
        println!(
            "{}: {} promoted, {} pending, {} retired removed, {} retired in use",
            name,
            report.promoted.len(),
            report.pending.len(),
            report.retired_removed,
            report.retired_remaining
        );
        if report.locked {
            println!("{name}: update in progress, reconciliation skipped");
        }
        pending |= !report.pending.is_empty();
    }
    if pending { EXIT_RESTART_REQUIRED } else { 0 }
}

/// Handle cleanup command - remove scratch directories and retired files
fn handle_cleanup(cfg: &UpdaterConfig, target: Option<String>) -> Result<i32> {
    for t in selected_targets(cfg, target.as_deref())? {
        let updater = Updater::new(cfg, UpdateTarget::from_config(t)?)?;
        let report = match updater.cleanup() {
            Ok(report) => report,
            Err(UpdateError::AttemptInProgress(_)) => {
                println!("{}: update in progress, skipped", t.name);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        println!(
            "{}: scratch {}, {} retired removed, {} retired in use",
            t.name,
            if report.scratch_removed { "removed" } else { "absent" },
            report.retired_removed,
            report.retired_remaining
        );
    }
    Ok(0)
}
