//! User-maintained list of paths the installer must not overwrite

use std::fs;
use std::path::Path;

use log::{debug, warn};

/// Case-insensitive path fragments; a relative path containing any of them
/// is skipped.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    fragments: Vec<String>,
}

impl IgnoreList {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| normalize(f.as_ref().trim()))
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Read one fragment per line; blank lines and `#` comments are skipped.
    /// A missing or unreadable file yields an empty list.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let list = Self::new(
                    raw.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#')),
                );
                debug!("Loaded {} ignore entries from {}", list.len(), path.display());
                list
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Failed to read ignore list {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.fragments.is_empty() {
            return false;
        }
        let path = normalize(&relative.to_string_lossy());
        self.fragments.iter().any(|f| path.contains(f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

fn normalize(raw: &str) -> String {
    raw.replace('\\', "/").to_lowercase()
}
