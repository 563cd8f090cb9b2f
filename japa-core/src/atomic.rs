//! Atomic file replacement shared by every local store file.
//!
//! Write flow: serialize → `<name>.tmp` sibling → `fsync` → `chmod 0600` →
//! `rename`. The `.tmp` file is always in the same directory as the target so
//! the rename never crosses filesystems.

use std::fs::{self, File, OpenOptions};
use std::io::Write;

use fs2::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};

/// Replace `path` with `bytes`, creating parent directories (mode `0700`).
///
/// On return the new content is on disk; on error the previous content is
/// left in place and the `.tmp` sibling is removed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;

    let tmp = tmp_path(path);
    let result = write_tmp(&tmp, bytes).and_then(|()| {
        fs::rename(&tmp, path).map_err(|e| io_err(path, e))
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Create the parent directory of `path` (mode `0700`) if it is missing.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    Ok(())
}

/// Block until an exclusive advisory lock on `lock_path` is held.
///
/// The lock lasts until the returned file is dropped. Other processes
/// opening the same store wait here instead of overwriting each other.
pub(crate) fn lock_exclusive(lock_path: &Path) -> Result<File, StoreError> {
    ensure_parent(lock_path)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| io_err(lock_path, e))?;
    file.lock_exclusive().map_err(|e| io_err(lock_path, e))?;
    Ok(file)
}

/// `<path>.tmp`, e.g. `events.json` → `events.json.tmp`.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_tmp(tmp: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    file.write_all(bytes).map_err(|e| io_err(tmp, e))?;
    file.sync_all().map_err(|e| io_err(tmp, e))?;
    set_file_permissions(tmp)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
