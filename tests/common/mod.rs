#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use liveswap::RetryConfig;
use liveswap::install::{FileSwapper, NativeSwapper, SwapError};

/// Real filesystem swapper with scripted failures keyed by file name.
#[derive(Default)]
pub struct ScriptedSwapper {
    inner: NativeSwapper,
    /// Hot swap reports a lock violation
    pub locked: HashSet<String>,
    /// Rename-aside is refused
    pub refuse_rename: HashSet<String>,
    /// Staging as `.new` fails
    pub refuse_stage: HashSet<String>,
    pub hot_swap_calls: Mutex<Vec<String>>,
}

impl ScriptedSwapper {
    pub fn locked(mut self, name: &str) -> Self {
        self.locked.insert(name.to_string());
        self
    }

    pub fn refuse_rename(mut self, name: &str) -> Self {
        self.refuse_rename.insert(name.to_string());
        self
    }

    pub fn refuse_stage(mut self, name: &str) -> Self {
        self.refuse_stage.insert(name.to_string());
        self
    }

    pub fn hot_swap_count(&self, name: &str) -> usize {
        self.hot_swap_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }
}

fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl FileSwapper for ScriptedSwapper {
    fn try_hot_swap(&self, src: &Path, dest: &Path) -> Result<(), SwapError> {
        let name = name_of(dest);
        self.hot_swap_calls.lock().unwrap().push(name.clone());
        if self.locked.contains(&name) {
            return Err(SwapError::Locked(io::Error::other("held open by test")));
        }
        self.inner.try_hot_swap(src, dest)
    }

    fn try_atomic_displace(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError> {
        if self.refuse_rename.contains(&name_of(dest)) {
            return Err(SwapError::Refused(io::Error::other("rename refused by test")));
        }
        self.inner.try_atomic_displace(src, dest)
    }

    fn stage_deferred(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError> {
        if self.refuse_stage.contains(&name_of(dest)) {
            return Err(SwapError::Io(io::Error::other("disk full")));
        }
        self.inner.stage_deferred(src, dest)
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Every file under `root` (relative path, contents)
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// File names in `dir` ending with `suffix`
pub fn names_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(suffix))
        .collect();
    names.sort();
    names
}
