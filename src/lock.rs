//! the index lock: an exclusive advisory file lock on `<meta>/index.lock`,
//! held for the duration of any index mutation (add, remove, commit, checkout).

use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::error::{Error, IoResultExt, Result};

/// guard releasing the lock on drop
pub struct IndexLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}

/// acquire the exclusive lock at `<meta>/index.lock`, blocking until available
pub fn acquire(meta_dir: &Path) -> Result<IndexLock> {
    let lock_path = lock_path(meta_dir);
    let file = File::create(&lock_path).with_path(&lock_path)?;
    write_pid(&lock_path)?;
    let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, _)| Error::IndexLocked(None))?;
    Ok(IndexLock { flock })
}

/// like [`acquire`] but returns `None` immediately instead of blocking if contended
pub fn try_acquire(meta_dir: &Path) -> Result<Option<IndexLock>> {
    let lock_path = lock_path(meta_dir);
    let file = File::create(&lock_path).with_path(&lock_path)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(flock) => {
            write_pid(&lock_path)?;
            Ok(Some(IndexLock { flock }))
        }
        Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
        Err((_, errno)) => {
            let holder = read_pid(&lock_path);
            let _ = errno;
            Err(Error::IndexLocked(holder))
        }
    }
}

fn lock_path(meta_dir: &Path) -> PathBuf {
    meta_dir.join("index.lock")
}

fn write_pid(lock_path: &Path) -> Result<()> {
    crate::ioutil::atomic_write(
        &lock_path.with_extension("lock.owner"),
        std::process::id().to_string().as_bytes(),
        0o644,
    )
}

/// best-effort PID recorded by whoever holds (or last held) the lock; used to
/// detect stale locks left by a crashed process
fn read_pid(lock_path: &Path) -> Option<i32> {
    let owner_path = lock_path.with_extension("lock.owner");
    std::fs::read_to_string(owner_path).ok()?.trim().parse().ok()
}

/// `true` if the PID recorded in the lock's owner file no longer names a live process
pub fn is_stale(meta_dir: &Path) -> bool {
    match read_pid(&lock_path(meta_dir)) {
        Some(pid) => process_is_dead(pid),
        None => false,
    }
}

#[cfg(unix)]
fn process_is_dead(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err()
}

#[cfg(not(unix))]
fn process_is_dead(_pid: i32) -> bool {
    false
}
