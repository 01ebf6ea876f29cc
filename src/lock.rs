//! One update attempt per install root, across threads and processes.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::debug;

use crate::error::{Result, UpdateError};

/// Exclusive advisory lock held for the duration of an attempt.
///
/// The lock file lives beside the install root
/// (`<parent>/<root name>.update.lock`) so it never shows up in the tree
/// being updated. Released on drop.
#[derive(Debug)]
pub struct AttemptLock {
    file: File,
    path: PathBuf,
}

impl AttemptLock {
    pub fn lock_path(install_root: &Path) -> PathBuf {
        let name = install_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let parent = install_root.parent().unwrap_or(install_root);
        parent.join(format!("{name}.update.lock"))
    }

    /// Take the lock or fail with [`UpdateError::AttemptInProgress`].
    pub fn acquire(install_root: &Path) -> Result<Self> {
        let path = Self::lock_path(install_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|e| lock_error(install_root, e))?;

        debug!("Acquired update lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Like [`AttemptLock::acquire`], but `Ok(None)` while another attempt
    /// holds the lock.
    pub fn try_acquire(install_root: &Path) -> Result<Option<Self>> {
        match Self::acquire(install_root) {
            Ok(lock) => Ok(Some(lock)),
            Err(UpdateError::AttemptInProgress(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Only contention means "attempt in progress"; anything else is a real I/O
/// failure on the lock file.
fn lock_error(install_root: &Path, err: io::Error) -> UpdateError {
    let contended = fs2::lock_contended_error().raw_os_error();
    if err.kind() == io::ErrorKind::WouldBlock
        || (err.raw_os_error().is_some() && err.raw_os_error() == contended)
    {
        UpdateError::AttemptInProgress(install_root.to_path_buf())
    } else {
        UpdateError::Io(err)
    }
}

impl Drop for AttemptLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
