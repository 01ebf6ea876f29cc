//! Package extraction into the scratch tree
//!
//! Handles `.zip`, `.7z` and `.tar.gz` packages, then strips redundant
//! wrapper directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;
use tar::Archive;
use zip::ZipArchive;

use crate::error::{Result, UpdateError};

/// Archive formats the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    TarGz,
}

impl ArchiveKind {
    /// Detect the format from a file name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if lower.ends_with(".7z") {
            Some(ArchiveKind::SevenZip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else {
            None
        }
    }

    /// Extension used for the scratch copy of the download
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => ".zip",
            ArchiveKind::SevenZip => ".7z",
            ArchiveKind::TarGz => ".tar.gz",
        }
    }
}

/// Unpack `archive` into `output_dir` on a blocking worker, then descend
/// through up to `strip_levels` single-child wrapper directories.
///
/// Returns the directory holding the payload root.
pub async fn extract_package(
    archive: &Path,
    kind: ArchiveKind,
    output_dir: &Path,
    strip_levels: usize,
) -> Result<PathBuf> {
    let archive = archive.to_path_buf();
    let output_dir = output_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        fs::create_dir_all(&output_dir)?;
        match kind {
            ArchiveKind::Zip => extract_zip(&archive, &output_dir)?,
            ArchiveKind::SevenZip => extract_7z(&archive, &output_dir)?,
            ArchiveKind::TarGz => extract_tar_gz(&archive, &output_dir)?,
        }
        let root = strip_wrapper_dirs(&output_dir, strip_levels)?;
        debug!("Extracted {} to {}", archive.display(), root.display());
        Ok(root)
    })
    .await
    .map_err(|e| UpdateError::Archive(format!("extraction task failed: {e}")))?
}

fn extract_zip(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let zip_file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(zip_file)
        .map_err(|e| UpdateError::Archive(format!("failed to read ZIP archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::Archive(format!("failed to read ZIP entry {i}: {e}")))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            UpdateError::Archive(format!("unsafe path in ZIP archive: {}", entry.name()))
        })?;
        let out_path = output_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|e| UpdateError::Archive(format!("failed to extract {}: {e}", entry.name())))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    Ok(())
}

fn extract_7z(archive_path: &Path, output_dir: &Path) -> Result<()> {
    sevenz_rust2::decompress_file(archive_path, output_dir)
        .map_err(|e| UpdateError::Archive(format!("failed to extract 7z archive: {e}")))
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let tar_gz_file = fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz_file));
    archive
        .unpack(output_dir)
        .map_err(|e| UpdateError::Archive(format!("failed to extract tar.gz archive: {e}")))
}

/// Descend while the directory holds exactly one entry and it is a
/// directory, at most `levels` times.
pub fn strip_wrapper_dirs(root: &Path, levels: usize) -> io::Result<PathBuf> {
    let mut current = root.to_path_buf();
    for _ in 0..levels {
        let mut entries = fs::read_dir(&current)?;
        let (Some(first), None) = (entries.next(), entries.next()) else {
            break;
        };
        let first = first?;
        if !first.file_type()?.is_dir() {
            break;
        }
        current = first.path();
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn kind_from_name() {
        assert_eq!(ArchiveKind::from_name("Tool-v1.ZIP"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_name("a.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_name("a.7z"), Some(ArchiveKind::SevenZip));
        assert_eq!(ArchiveKind::from_name("a.exe"), None);
    }

    #[test]
    fn strip_descends_through_single_child_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("Tool").join("Tool-1.0");
        fs::create_dir_all(deep.join("bin")).unwrap();
        fs::write(deep.join("app.dll"), b"x").unwrap();

        assert_eq!(strip_wrapper_dirs(dir.path(), 0).unwrap(), dir.path());
        assert_eq!(strip_wrapper_dirs(dir.path(), 1).unwrap(), dir.path().join("Tool"));
        assert_eq!(strip_wrapper_dirs(dir.path(), 5).unwrap(), deep);
    }

    #[test]
    fn strip_stops_at_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("only")).unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        assert_eq!(strip_wrapper_dirs(dir.path(), 2).unwrap(), dir.path());
    }

    #[tokio::test]
    async fn zip_is_extracted_and_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("update.zip");
        write_zip(
            &archive,
            &[("pkg/app.dll", b"new dll"), ("pkg/res/data.json", b"{}")],
        );

        let root = extract_package(&archive, ArchiveKind::Zip, &dir.path().join("contents"), 1)
            .await
            .unwrap();

        assert_eq!(root, dir.path().join("contents").join("pkg"));
        assert_eq!(fs::read(root.join("app.dll")).unwrap(), b"new dll");
        assert_eq!(fs::read(root.join("res/data.json")).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn corrupt_zip_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("update.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_package(&archive, ArchiveKind::Zip, &dir.path().join("out"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Archive(_)));
    }

    #[tokio::test]
    async fn tar_gz_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("update.tar.gz");
        {
            let enc = flate2::write::GzEncoder::new(
                fs::File::create(&archive).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(enc);
            let data = b"payload";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "lib/core.so", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let root = extract_package(&archive, ArchiveKind::TarGz, &dir.path().join("out"), 0)
            .await
            .unwrap();
        assert_eq!(fs::read(root.join("lib/core.so")).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn seven_zip_is_extracted_and_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let wrapper = staging.join("Tool-1.3.0");
        fs::create_dir_all(wrapper.join("plugins")).unwrap();
        fs::write(wrapper.join("app.dll"), b"7z dll").unwrap();
        fs::write(wrapper.join("plugins/extra.dll"), b"plugin").unwrap();

        let archive = dir.path().join("update.7z");
        sevenz_rust2::compress_to_path(&staging, &archive).unwrap();

        let root = extract_package(&archive, ArchiveKind::SevenZip, &dir.path().join("contents"), 1)
            .await
            .unwrap();

        assert_eq!(root, dir.path().join("contents").join("Tool-1.3.0"));
        assert_eq!(fs::read(root.join("app.dll")).unwrap(), b"7z dll");
        assert_eq!(fs::read(root.join("plugins/extra.dll")).unwrap(), b"plugin");
    }

    #[tokio::test]
    async fn corrupt_seven_zip_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("update.7z");
        fs::write(&archive, b"7z but not really").unwrap();

        let err = extract_package(&archive, ArchiveKind::SevenZip, &dir.path().join("out"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Archive(_)));
    }
}
