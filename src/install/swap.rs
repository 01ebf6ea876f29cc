//! File replacement capabilities
//!
//! The installer only talks to [`FileSwapper`]; [`NativeSwapper`] implements
//! it with the current platform's primitives.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::platform;
use super::sentinel;

/// Why a single tier failed for one file
#[derive(Error, Debug)]
pub enum SwapError {
    /// Destination is held open by a process (sharing/lock violation)
    #[error("file is locked: {}", platform::describe(.0))]
    Locked(io::Error),

    /// Rename of the open destination was refused by the filesystem
    #[error("rename refused: {}", platform::describe(.0))]
    Refused(io::Error),

    #[error("{}", platform::describe(.0))]
    Io(io::Error),
}

/// The three install tiers, plus the optional reboot-delete hint.
pub trait FileSwapper: Send + Sync {
    /// Tier 1: overwrite `dest` in place with the contents of `src`.
    fn try_hot_swap(&self, src: &Path, dest: &Path) -> Result<(), SwapError>;

    /// Tier 2: rename `dest` aside as a retired `.old` file and copy `src`
    /// into the vacated path. Returns the retired path.
    fn try_atomic_displace(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError>;

    /// Tier 3: write `src` beside `dest` as `<dest>.new`, leaving `dest` alone.
    fn stage_deferred(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError>;

    /// Best-effort deletion of `path` on next boot.
    fn schedule_delete_on_reboot(&self, _path: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// Swapper backed by the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSwapper;

impl NativeSwapper {
    fn clear_readonly_if_present(path: &Path) -> io::Result<()> {
        match platform::clear_readonly(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Copy `src` into a synced temp file in `dest`'s directory, carrying
/// over the source permissions.
fn write_beside(src: &Path, dest: &Path) -> io::Result<NamedTempFile> {
    let dir = dest
        .parent()
        .ok_or_else(|| io::Error::other("destination has no parent"))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(sentinel::PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    let mut source = fs::File::open(src)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), source.metadata()?.permissions())?;
    Ok(tmp)
}

fn classify(err: io::Error) -> SwapError {
    if platform::is_lock_violation(&err) {
        SwapError::Locked(err)
    } else {
        SwapError::Io(err)
    }
}

impl FileSwapper for NativeSwapper {
    /// Writes a sibling temp file and renames it over `dest`. The old inode
    /// is never truncated, so processes that mapped it keep their view.
    #[cfg(unix)]
    fn try_hot_swap(&self, src: &Path, dest: &Path) -> Result<(), SwapError> {
        let tmp = write_beside(src, dest).map_err(classify)?;
        tmp.persist(dest).map_err(|e| classify(e.error))?;
        Ok(())
    }

    /// In-place overwrite; a loaded image fails with a sharing violation,
    /// which sends the file to the displace tier.
    #[cfg(not(unix))]
    fn try_hot_swap(&self, src: &Path, dest: &Path) -> Result<(), SwapError> {
        Self::clear_readonly_if_present(dest).map_err(classify)?;
        fs::copy(src, dest).map_err(classify)?;
        Ok(())
    }

    fn try_atomic_displace(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError> {
        let retired = sentinel::retired_path(dest);
        fs::rename(dest, &retired).map_err(SwapError::Refused)?;

        if let Err(e) = fs::copy(src, dest) {
            // Put the original back so the live path is never left empty.
            let _ = fs::remove_file(dest);
            if let Err(restore) = fs::rename(&retired, dest) {
                warn!(
                    "Failed to restore {} from {}: {}",
                    dest.display(),
                    retired.display(),
                    restore
                );
            }
            return Err(SwapError::Io(e));
        }

        debug!("Displaced {} -> {}", dest.display(), retired.display());
        Ok(retired)
    }

    fn stage_deferred(&self, src: &Path, dest: &Path) -> Result<PathBuf, SwapError> {
        let staged = sentinel::staged_path(dest);
        Self::clear_readonly_if_present(&staged).map_err(SwapError::Io)?;

        // A crash before persist leaves only a partial temp file, never a
        // truncated `.new` for the reconciler to promote.
        let tmp = write_beside(src, dest).map_err(SwapError::Io)?;
        tmp.persist(&staged).map_err(|e| SwapError::Io(e.error))?;

        Ok(staged)
    }

    fn schedule_delete_on_reboot(&self, path: &Path) -> io::Result<()> {
        platform::schedule_delete_on_reboot(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("dest.bin");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();
        (dir, src, dest)
    }

    #[test]
    fn hot_swap_overwrites() {
        let (dir, src, dest) = setup();
        NativeSwapper.try_hot_swap(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        // no temp or sentinel files left next to the destination
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn hot_swap_keeps_mapped_original_intact() {
        use std::os::unix::io::AsRawFd;

        let (_dir, src, dest) = setup();
        let held = fs::File::open(&dest).unwrap();
        let len = 3;
        // SAFETY: `held` is open for reading and at least `len` bytes long.
        let mapping = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                held.as_raw_fd(),
                0,
            )
        };
        assert_ne!(mapping, libc::MAP_FAILED);

        NativeSwapper.try_hot_swap(&src, &dest).unwrap();

        // SAFETY: the mapping is live and `len` bytes long until munmap.
        let seen = unsafe { std::slice::from_raw_parts(mapping as *const u8, len) }.to_vec();
        unsafe { libc::munmap(mapping, len) };
        assert_eq!(seen, b"old");
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn hot_swap_replaces_read_only_destination() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, src, dest) = setup();
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o444)).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        NativeSwapper.try_hot_swap(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn displace_works_while_destination_is_open() {
        use std::io::Read;

        let (_dir, src, dest) = setup();
        let mut held = fs::File::open(&dest).unwrap();

        let retired = NativeSwapper.try_atomic_displace(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(fs::read(&retired).unwrap(), b"old");
        let mut buf = Vec::new();
        held.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"old");
    }

    #[test]
    fn displace_restores_original_when_copy_fails() {
        let (dir, _src, dest) = setup();
        let missing = dir.path().join("missing.bin");

        let err = NativeSwapper.try_atomic_displace(&missing, &dest).unwrap_err();
        assert!(matches!(err, SwapError::Io(_)));
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| sentinel::is_retired(&e.as_ref().unwrap().path()))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn staging_leaves_live_file_untouched() {
        let (dir, src, dest) = setup();
        let staged = NativeSwapper.stage_deferred(&src, &dest).unwrap();

        assert_eq!(staged, sentinel::staged_path(&dest));
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert_eq!(fs::read(&staged).unwrap(), b"new");
        // only src, dest and the staged file remain
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
