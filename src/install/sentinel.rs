//! Sentinel file naming
//!
//! `<path>.new` is a staged replacement that is not active yet;
//! `<path>.<token>.old` is a retired original that may be deleted at any time.
//! `.liveswap-*` is a partially written copy; it is only live while an attempt
//! holds the lock.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const STAGED_SUFFIX: &str = ".new";
pub const RETIRED_SUFFIX: &str = ".old";
/// Name prefix of in-progress copies written beside their destination
pub const PARTIAL_PREFIX: &str = ".liveswap-";

/// `<path>.new`
pub fn staged_path(live: &Path) -> PathBuf {
    with_suffix(live, STAGED_SUFFIX)
}

/// `<path>.<token>.old` with a fresh random token
pub fn retired_path(live: &Path) -> PathBuf {
    let token = uuid::Uuid::new_v4().simple().to_string();
    with_suffix(live, &format!(".{}{}", &token[..12], RETIRED_SUFFIX))
}

pub fn is_staged(path: &Path) -> bool {
    has_suffix(path, STAGED_SUFFIX)
}

pub fn is_retired(path: &Path) -> bool {
    has_suffix(path, RETIRED_SUFFIX)
}

/// Temp file left behind by an interrupted copy
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > PARTIAL_PREFIX.len() && n.starts_with(PARTIAL_PREFIX))
}

pub fn is_sentinel(path: &Path) -> bool {
    is_staged(path) || is_retired(path) || is_partial(path)
}

/// Live path a staged file is promoted to (`foo.dll.new` -> `foo.dll`)
pub fn live_path_for_staged(staged: &Path) -> Option<PathBuf> {
    let name = staged.file_name()?.to_str()?;
    let live = name.strip_suffix(STAGED_SUFFIX)?;
    if live.is_empty() {
        return None;
    }
    Some(staged.with_file_name(live))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > suffix.len() && n.ends_with(suffix))
}
