//! Installation of an extracted package over a live install root
//!
//! - `installer` - per-file three-tier install with bounded retries
//! - `swap` - `FileSwapper` capability trait and the native implementation
//! - `platform` - read-only clearing, lock classification, reboot deletion
//! - `sentinel` - `.new` / `.old` naming convention
//! - `ignore` - user ignore list
//! - `backup` - top-level backup for full-package installs

mod backup;
mod ignore;
mod installer;
mod platform;
pub mod sentinel;
mod swap;

pub use backup::{BACKUP_DIR, backup_top_level};
pub use ignore::IgnoreList;
pub use installer::{FileInstaller, InstallPlan, InstallResult, InstallTier, PerFileOutcome};
pub use platform::clear_readonly;
pub use swap::{FileSwapper, NativeSwapper, SwapError};

use crate::error::{Result, UpdateError};

/// Run filesystem work on the blocking pool instead of an async worker.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?
}
