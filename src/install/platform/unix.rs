use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Add the owner write bit if the file is read-only
pub fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        perms.set_mode(perms.mode() | 0o200);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// `ETXTBSY` (writing a running executable) and `EBUSY`
pub fn is_lock_violation(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::ETXTBSY || code == libc::EBUSY)
}

/// No reboot-delete primitive; retired files are left to the `.old` sweep.
pub fn schedule_delete_on_reboot(_path: &Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}
