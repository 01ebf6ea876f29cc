//! Numeric release versions extracted from tags like `v1.2.3-beta`

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9.]*").expect("version pattern is valid"));

/// Dot-separated numeric version. Missing trailing components compare as 0.
#[derive(Debug, Clone, Eq)]
pub struct ReleaseVersion {
    parts: Vec<u64>,
}

impl ReleaseVersion {
    /// Extract a version from a release tag.
    ///
    /// Strips a leading `v`, drops everything after the first `-`, then takes
    /// the first run of digits and dots. Returns `None` when no usable run
    /// exists.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let trimmed = tag.trim().trim_start_matches(['v', 'V']);
        let head = trimmed.split('-').next().unwrap_or_default();
        let run = VERSION_RUN.find(head)?.as_str().trim_matches('.');
        Self::parse(run)
    }

    /// Parse a plain `X[.Y[.Z...]]` string.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        let parts = raw
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self { parts })
    }

    /// Keep at most `n` leading components.
    pub fn truncated(mut self, n: usize) -> Self {
        self.parts.truncate(n.max(1));
        self
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}
