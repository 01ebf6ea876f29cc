//! Platform primitives used by the native swapper.
//!
//! Each platform provides:
//! - `clear_readonly` - make an existing file writable
//! - `is_lock_violation` - classify an I/O error as "file in use"
//! - `schedule_delete_on_reboot` - best-effort deferred deletion

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod windows;
        pub use self::windows::{clear_readonly, is_lock_violation, schedule_delete_on_reboot};
    } else if #[cfg(unix)] {
        mod unix;
        pub use self::unix::{clear_readonly, is_lock_violation, schedule_delete_on_reboot};
    } else {
        use std::io;
        use std::path::Path;

        pub fn clear_readonly(path: &Path) -> io::Result<()> {
            let mut perms = std::fs::metadata(path)?.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                std::fs::set_permissions(path, perms)?;
            }
            Ok(())
        }

        pub fn is_lock_violation(_err: &io::Error) -> bool {
            false
        }

        pub fn schedule_delete_on_reboot(_path: &Path) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }
}

/// Human-readable error with lock classification and raw OS code
pub fn describe(err: &std::io::Error) -> String {
    let class = if is_lock_violation(err) { "locked" } else { "i/o" };
    match err.raw_os_error() {
        Some(code) => format!("{class}: {err} (os error {code})"),
        None => format!("{class}: {err}"),
    }
}
