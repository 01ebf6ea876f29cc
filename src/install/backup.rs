//! Top-level backup taken before a full-package install

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::sentinel;

pub const BACKUP_DIR: &str = "backup";

/// Copy the regular top-level files of `root` into `<root>/backup`,
/// recreating the directory. Sentinel files are skipped.
///
/// Returns the number of files copied.
pub fn backup_top_level(root: &Path) -> io::Result<usize> {
    let backup_dir: PathBuf = root.join(BACKUP_DIR);
    if backup_dir.exists() {
        fs::remove_dir_all(&backup_dir)?;
    }
    fs::create_dir_all(&backup_dir)?;

    let mut copied = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() || sentinel::is_sentinel(&entry.path()) {
            continue;
        }
        fs::copy(entry.path(), backup_dir.join(entry.file_name()))?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_only_live_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("app.dll"), b"a").unwrap();
        fs::write(root.join("app.dll.new"), b"b").unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/deep.dll"), b"c").unwrap();
        fs::create_dir_all(root.join(BACKUP_DIR)).unwrap();
        fs::write(root.join(BACKUP_DIR).join("stale.dll"), b"s").unwrap();

        assert_eq!(backup_top_level(root).unwrap(), 1);
        assert_eq!(fs::read(root.join("backup/app.dll")).unwrap(), b"a");
        assert!(!root.join("backup/stale.dll").exists());
        assert!(!root.join("backup/app.dll.new").exists());
    }
}
