//! Asset download and package extraction
//!
//! - `core` - streaming download with progress tracking
//! - `extract` - ZIP / 7z / tar.gz extraction and wrapper-directory stripping
//! - `quarantine` - removal of platform download markers

mod core;
mod extract;
mod quarantine;

pub use self::core::download_to_file;
pub use extract::{ArchiveKind, extract_package, strip_wrapper_dirs};
pub use quarantine::unblock_tree;
