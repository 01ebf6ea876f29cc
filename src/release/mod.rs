//! Release feed discovery and version resolution
//!
//! - `github` - feed client and release metadata
//! - `version` - numeric version extraction from tags
//! - `select` - newest eligible release and matching asset

mod github;
mod select;
mod version;

pub use github::{FeedClient, ReleaseAsset, ReleaseMetadata};
pub use select::{select_asset, select_latest};
pub use version::ReleaseVersion;

/// A release that is newer than the running version, with its chosen asset
#[derive(Debug, Clone)]
pub struct ResolvedUpdate {
    pub release: ReleaseMetadata,
    pub version: ReleaseVersion,
    pub asset: ReleaseAsset,
}
