//! GitHub-compatible release feed

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};

/// Release metadata from the feed
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReleaseMetadata {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    /// Markdown release notes
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseMetadata {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// Release asset metadata
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Thin client over the `/repos/{repo}/releases` endpoint
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    api_base: String,
}

impl FeedClient {
    pub fn new(api_base: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Underlying HTTP client, shared with the downloader
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch every release of `repo`, newest first as served by the feed.
    pub async fn fetch_releases(&self, repo: &str) -> Result<Vec<ReleaseMetadata>> {
        let url = format!("{}/repos/{}/releases", self.api_base, repo);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpdateError::Network(format!(
                "release feed error for {}: HTTP {}",
                repo,
                response.status()
            )));
        }

        let releases: Vec<ReleaseMetadata> = response.json().await?;
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_fields_deserialize() {
        let raw = r#"[{
            "tag_name": "v1.0.0",
            "name": null,
            "html_url": "https://example.invalid/r/1",
            "body": null,
            "prerelease": false,
            "draft": false,
            "assets": [{"name": "a.zip", "browser_download_url": "https://x/a.zip", "size": 3}]
        }]"#;
        let releases: Vec<ReleaseMetadata> = serde_json::from_str(raw).unwrap();
        assert_eq!(releases[0].display_name(), "v1.0.0");
        assert_eq!(releases[0].assets.len(), 1);
    }
}
