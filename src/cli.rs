use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "liveswap in-place updater")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Report whether a newer release is available (Exit 0 = up to date, 3 = update available)
    Check {
        /// Only this target (default: all configured targets)
        #[arg(long, short = 't')]
        target: Option<String>,

        /// Consider prereleases
        #[arg(long)]
        prerelease: bool,
    },
    /// Download and install the newest release (Exit 2 = restart required)
    Update {
        #[arg(long, short = 't')]
        target: Option<String>,

        #[arg(long)]
        prerelease: bool,
    },
    /// Promote staged files and sweep retired ones, then report what is left
    Reconcile,
    /// Remove scratch directories and retired files
    Cleanup {
        #[arg(long, short = 't')]
        target: Option<String>,
    },
}
