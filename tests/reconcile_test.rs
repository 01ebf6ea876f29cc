mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use common::{ScriptedSwapper, fast_retry, names_with_suffix, read, write_file};
use liveswap::cleanup::cleanup_attempt;
use liveswap::lock::AttemptLock;
use liveswap::{FileInstaller, InstallPlan, Reporter, StartupReconciler};

/// Relative path -> (len, mtime) of every entry under `root`
fn metadata_listing(root: &Path) -> BTreeMap<PathBuf, (u64, SystemTime)> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let meta = e.metadata().unwrap();
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                (meta.len(), meta.modified().unwrap()),
            )
        })
        .collect()
}

#[test]
fn nothing_pending_means_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Tool");
    write_file(&root.join("app.exe"), "v1");
    write_file(&root.join("lib/core.dll"), "core");

    let before = metadata_listing(&root);
    let reconciler = StartupReconciler::new(&root);

    let first = reconciler.run();
    let second = reconciler.run();

    assert!(first.is_clean());
    assert!(first.promoted.is_empty());
    assert_eq!(first, second);
    assert_eq!(metadata_listing(&root), before);
}

#[test]
fn missing_root_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let report = StartupReconciler::new(dir.path().join("absent")).run();
    assert!(report.is_clean());
    assert!(!dir.path().join("absent").exists());
}

#[test]
fn staged_files_are_promoted_and_retired_swept() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Tool");
    write_file(&root.join("app.exe"), "v1");
    write_file(&root.join("app.exe.new"), "v2");
    write_file(&root.join("lib/extra.dll.new"), "fresh");
    write_file(&root.join("lib/core.dll.0123456789ab.old"), "retired");

    let report = StartupReconciler::new(&root).run();

    assert_eq!(report.retired_removed, 1);
    assert_eq!(report.promoted.len(), 2);
    assert!(report.is_clean());
    assert_eq!(read(&root.join("app.exe")), "v2");
    assert_eq!(read(&root.join("lib/extra.dll")), "fresh");
    assert!(names_with_suffix(&root, ".new").is_empty());
    assert!(names_with_suffix(&root.join("lib"), ".old").is_empty());
}

#[test]
fn unpromotable_staged_file_stays_pending() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Tool");
    // A directory occupies the live path, so the promotion cannot replace it.
    fs::create_dir_all(root.join("data/entry")).unwrap();
    write_file(&root.join("data/entry.new"), "staged");

    let report = StartupReconciler::new(&root).run();

    assert_eq!(report.pending, vec![root.join("data/entry.new")]);
    assert!(!report.is_clean());
    assert_eq!(read(&root.join("data/entry.new")), "staged");
}

#[test]
fn running_attempt_blocks_promotion() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Tool");
    write_file(&root.join("app.exe"), "v1");
    write_file(&root.join("app.exe.new"), "v2");
    write_file(&root.join(".liveswap-q7Rm2x"), "copy in flight");

    let attempt = AttemptLock::acquire(&root).unwrap();
    let report = StartupReconciler::new(&root).run();

    assert!(report.locked);
    assert!(!report.is_clean());
    assert!(report.promoted.is_empty());
    assert_eq!(read(&root.join("app.exe")), "v1");
    assert_eq!(read(&root.join(".liveswap-q7Rm2x")), "copy in flight");

    drop(attempt);
    let report = StartupReconciler::new(&root).run();
    assert!(report.is_clean());
    assert_eq!(read(&root.join("app.exe")), "v2");
    assert!(!root.join(".liveswap-q7Rm2x").exists());
}

#[tokio::test]
async fn deferred_install_is_finished_by_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Tool.tmp/contents");
    let root = dir.path().join("Tool");
    write_file(&source.join("app.exe"), "v2");
    write_file(&root.join("app.exe"), "v1");

    let swapper = ScriptedSwapper::default()
        .locked("app.exe")
        .refuse_rename("app.exe");
    let result = FileInstaller::new(Arc::new(swapper), fast_retry())
        .install(
            InstallPlan {
                source,
                destination: root.clone(),
            },
            &Reporter::silent(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(result.needs_restart());

    // Cleanup between attempts must leave the staged file alone.
    let cleanup = cleanup_attempt(&dir.path().join("Tool.tmp"), &root);
    assert!(cleanup.scratch_removed);
    assert_eq!(read(&root.join("app.exe.new")), "v2");

    let report = StartupReconciler::new(&root).run();
    assert_eq!(report.promoted, vec![root.join("app.exe")]);
    assert_eq!(read(&root.join("app.exe")), "v2");
    assert!(!root.join("app.exe.new").exists());
}
