//! atomic file I/O primitives
//!
//! every on-disk mutation in this crate — objects, refs, the index, checked-out
//! working-tree files — goes through [`atomic_write`] so a concurrent reader never
//! observes a partially written file.

use std::fs::{self, File, Permissions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{IoResultExt, Result};

/// write `data` to `target` atomically: a sibling temp file is created, written,
/// fsynced, chmod'd, then renamed over `target`. On unix, rename-over-existing is
/// already atomic; the same call works unchanged on Windows, where rename-over an
/// existing file is likewise required by this contract.
pub fn atomic_write(target: &Path, data: &[u8], mode: u32) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let tmp_path = parent.join(format!(
        ".tmp-{}-{}",
        std::process::id(),
        tmp_suffix()
    ));

    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(data).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    #[cfg(unix)]
    fs::set_permissions(&tmp_path, Permissions::from_mode(mode)).with_path(&tmp_path)?;
    #[cfg(not(unix))]
    let _ = mode;

    fs::rename(&tmp_path, target).with_path(target)?;

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// monotonic-ish suffix for temp file names; doesn't need to be cryptographically
/// unique, only unique among this process's concurrent writers to one directory
fn tmp_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// remove `path`; a no-op (not an error) if it doesn't exist
pub fn safe_remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(crate::error::Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// read `path`, distinguishing "absent" (`Ok(None)`) from any other error
pub fn read_strict(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(crate::error::Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// read `path`, treating "absent" as an empty byte vector
pub fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
    Ok(read_strict(path)?.unwrap_or_default())
}

/// create `path` and all missing parent directories; a no-op if it already exists
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_path(path)
}
