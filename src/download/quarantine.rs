//! Removal of "downloaded from the internet" markers
//!
//! Windows tags downloaded files with a `Zone.Identifier` alternate data
//! stream and macOS with the `com.apple.quarantine` extended attribute.
//! Other platforms have no such concept.

use std::path::Path;

use log::debug;
use walkdir::WalkDir;

/// Clear the quarantine marker on every file under `dir`. Returns the number
/// of files a marker was removed from.
pub fn unblock_tree(dir: &Path) -> usize {
    let mut cleared = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && unblock_file(entry.path()) {
            cleared += 1;
        }
    }
    if cleared > 0 {
        debug!("Cleared quarantine marker on {} files under {}", cleared, dir.display());
    }
    cleared
}

#[cfg(windows)]
fn unblock_file(path: &Path) -> bool {
    let mut stream = path.as_os_str().to_owned();
    stream.push(":Zone.Identifier");
    std::fs::remove_file(stream).is_ok()
}

#[cfg(target_os = "macos")]
fn unblock_file(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let name = c"com.apple.quarantine";
    // SAFETY: both pointers are valid NUL-terminated strings for the call.
    let rc = unsafe { libc::removexattr(c_path.as_ptr(), name.as_ptr(), libc::XATTR_NOFOLLOW) };
    rc == 0
}

#[cfg(not(any(windows, target_os = "macos")))]
fn unblock_file(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblocking_plain_files_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.dll"), b"x").unwrap();

        unblock_tree(dir.path());
        assert_eq!(std::fs::read(dir.path().join("a/b/c.dll")).unwrap(), b"x");
    }
}
