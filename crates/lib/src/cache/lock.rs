//! Per-slot locking of cache prepopulation.
//!
//! A slot is one `<ref_name>/<job_name>` pair. Two runs of the same slot at
//! once (a retried pipeline, a manual rerun) must not both create and fill
//! the target, so the second waits for the first and then finds the target
//! warm. Each slot has its own lock file, so jobs of other slots never wait.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error("failed to open lock file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Exclusive advisory lock on a slot; released on drop.
#[derive(Debug)]
pub struct CacheLock {
  _file: File,
}

impl CacheLock {
  /// Locks `path`, waiting for any other holder to finish.
  ///
  /// The parent directory must exist.
  pub fn acquire(path: &Path) -> Result<Self, CacheLockError> {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path)
      .map_err(|source| CacheLockError::Open {
        path: path.to_path_buf(),
        source,
      })?;

    let lock_err = |source: io::Error| CacheLockError::Lock {
      path: path.to_path_buf(),
      source,
    };

    if !try_lock(&file).map_err(lock_err)? {
      info!(path = %path.display(), "waiting for another run of this job to finish prepopulating");
      lock(&file).map_err(lock_err)?;
    }

    debug!(path = %path.display(), "acquired cache lock");
    Ok(Self { _file: file })
  }
}

/// Returns `false` when another handle holds the lock.
#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
  use rustix::fs::{FlockOperation, flock};
  use rustix::io::Errno;
  use std::os::unix::io::AsFd;

  match flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive) {
    Ok(()) => Ok(true),
    Err(e) if e == Errno::WOULDBLOCK => Ok(false),
    Err(e) => Err(io::Error::from_raw_os_error(e.raw_os_error())),
  }
}

#[cfg(unix)]
fn lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::LockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File) -> io::Result<bool> {
  use windows_sys::Win32::Foundation::ERROR_LOCK_VIOLATION;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY};

  match lock_file_ex(file, LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY) {
    Ok(()) => Ok(true),
    Err(e) if e.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) => Ok(false),
    Err(e) => Err(e),
  }
}

#[cfg(windows)]
fn lock(file: &File) -> io::Result<()> {
  use windows_sys::Win32::Storage::FileSystem::LOCKFILE_EXCLUSIVE_LOCK;

  lock_file_ex(file, LOCKFILE_EXCLUSIVE_LOCK)
}

#[cfg(windows)]
fn lock_file_ex(file: &File, flags: u32) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::LockFileEx;

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: `handle` is owned by `file` for the whole call, and a zeroed
  // OVERLAPPED is a valid request for a lock at offset 0.
  let locked = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if locked == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
