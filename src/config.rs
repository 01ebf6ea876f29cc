use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};

/// Top‑level updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Release feed API base (GitHub compatible)
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub allow_prerelease: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Abort a download when no bytes arrive for this long
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    /// Accepted archive extensions, in preference order
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
    /// Ignore list, relative to the install root
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("liveswap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_inactivity_timeout() -> u64 {
    300
}

fn default_archive_extensions() -> Vec<String> {
    vec![".7z".into(), ".zip".into(), ".tar.gz".into()]
}

fn default_ignore_file() -> String {
    "config/update_ignores.txt".to_string()
}

/// Per-file retry policy for hot swap / atomic displace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// On‑disk TOML description of one updatable product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub asset_keyword: String,
    pub install_root: PathBuf,
    pub current_version: String,
    /// `owner/name` of the release feed repository
    pub repo: String,
    #[serde(default)]
    pub full_package: bool,
    #[serde(default)]
    pub strip_levels: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            allow_prerelease: false,
            request_timeout_secs: default_request_timeout(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            archive_extensions: default_archive_extensions(),
            ignore_file: default_ignore_file(),
            retry: RetryConfig::default(),
            targets: vec![],
        }
    }
}

impl UpdaterConfig {
    /// Default config location: `<config dir>/liveswap/liveswap.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| UpdateError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join("liveswap").join("liveswap.toml"))
    }

    /// Load the config at `path`, writing a default one first if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config not found at {}, creating default configuration", path.display());
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let default_toml = toml::to_string_pretty(&UpdaterConfig::default())
                .map_err(|e| UpdateError::Config(format!("failed to serialize default config: {e}")))?;
            fs::write(path, default_toml)?;
        }

        let raw = fs::read_to_string(path)?;
        let cfg: UpdaterConfig = toml::from_str(&raw)
            .map_err(|e| UpdateError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_extensions.is_empty() {
            return Err(UpdateError::Config("archive_extensions must not be empty".into()));
        }
        for target in &self.targets {
            if target.asset_keyword.is_empty() {
                return Err(UpdateError::Config(format!(
                    "target '{}' has an empty asset_keyword",
                    target.name
                )));
            }
            if !target.repo.contains('/') {
                return Err(UpdateError::Config(format!(
                    "target '{}' repo must be 'owner/name', got '{}'",
                    target.name, target.repo
                )));
            }
        }
        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}
