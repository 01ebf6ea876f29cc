//! Release and asset selection

use log::debug;

use super::github::{ReleaseAsset, ReleaseMetadata};
use super::version::ReleaseVersion;
use crate::error::{Result, UpdateError};

/// Pick the newest eligible release strictly newer than `current`.
///
/// Prereleases are skipped unless `allow_prerelease` is set and tags without
/// a numeric version are skipped. Among eligible releases the greatest
/// version wins; on equal versions the earlier feed entry wins.
pub fn select_latest<'a>(
    releases: &'a [ReleaseMetadata],
    current: &ReleaseVersion,
    allow_prerelease: bool,
) -> Option<(&'a ReleaseMetadata, ReleaseVersion)> {
    let mut best: Option<(&ReleaseMetadata, ReleaseVersion)> = None;

    for release in releases {
        if release.prerelease && !allow_prerelease {
            continue;
        }
        let Some(version) = ReleaseVersion::from_tag(&release.tag_name) else {
            debug!("Skipping release with unparseable tag '{}'", release.tag_name);
            continue;
        };
        if version <= *current {
            continue;
        }
        match &best {
            Some((_, best_version)) if version <= *best_version => {}
            _ => best = Some((release, version)),
        }
    }

    best
}

/// First asset containing `keyword` with an accepted extension.
///
/// Extensions are tried in the given preference order, so a `.7z` asset wins
/// over a `.zip` one when both match.
pub fn select_asset<'a>(
    release: &'a ReleaseMetadata,
    keyword: &str,
    extensions: &[String],
) -> Result<&'a ReleaseAsset> {
    extensions
        .iter()
        .find_map(|ext| {
            let ext = ext.to_ascii_lowercase();
            release
                .assets
                .iter()
                .find(|a| a.name.contains(keyword) && a.name.to_ascii_lowercase().ends_with(&ext))
        })
        .ok_or_else(|| UpdateError::AssetNotFound {
            keyword: keyword.to_string(),
            tag: release.tag_name.clone(),
        })
}
