// ABOUTME: Owner-only file and directory writes for keys and certificates.
// ABOUTME: Files are replaced with 0600 permissions, SSH directories created with 0700.

use crate::error::{Result, SshError};
use std::io::Write;
use std::path::Path;

/// Write `contents` to `path`, replacing any existing file, readable only by the owner.
///
/// # Errors
/// Returns `SshError::WriteKey` or `SshError::SetPermissions` on failure.
pub fn write_private_file(path: &Path, contents: &str) -> Result<()> {
    let write_err = |e| SshError::WriteKey {
        path: path.to_path_buf(),
        source: e,
    };

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(contents.as_bytes()).map_err(write_err)?;

    // An existing file keeps its old mode through open(); reset it.
    set_mode(path, 0o600)
}

/// Create `dir` (and parents) if missing; a newly created directory gets 0700.
///
/// # Errors
/// Returns `SshError::CreateDirectory` or `SshError::SetPermissions` on failure.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| SshError::CreateDirectory {
        path: dir.to_path_buf(),
        source: e,
    })?;
    set_mode(dir, 0o700)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        SshError::SetPermissions {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
