//! In-place self-update engine.
//!
//! Resolves the newest release from a GitHub-style feed, downloads and
//! unpacks it into a scratch directory, then installs every file over a
//! live install root. Files that are locked by a running process are
//! displaced (renamed to `.<token>.old`) or, as a last resort, staged as
//! `.new` and promoted by [`StartupReconciler`] on the next start.

pub mod cleanup;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod install;
pub mod lock;
pub mod progress;
pub mod reconcile;
pub mod release;
pub mod state_machine;

pub use config::{RetryConfig, TargetConfig, UpdaterConfig};
pub use engine::{AttemptOutcome, UpdateTarget, Updater, reconcile_all};
pub use error::{Result, UpdateError};
pub use install::{FileInstaller, FileSwapper, InstallPlan, InstallResult, NativeSwapper, PerFileOutcome};
pub use progress::{Reporter, UpdateEvent, UpdatePhase};
pub use reconcile::{ReconcileReport, StartupReconciler};
pub use release::{ReleaseVersion, ResolvedUpdate};
pub use state_machine::AttemptState;
