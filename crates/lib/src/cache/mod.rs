//! Cache prepopulation.
//!
//! CI caches live at `<cache_root>/<project>/<kind>/<ref_name>/<job_name>`.
//! The first run of a job on a new branch would otherwise start cold; instead
//! the freshest cache of the same job from any branch is copied in. A target
//! that already exists is left untouched.

pub mod candidate;
pub mod copy;
pub mod lock;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, ConfigError};

pub use candidate::{Candidate, find_freshest};
pub use copy::{CopyStats, copy_tree};
pub use lock::{CacheLock, CacheLockError};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Lock(#[from] CacheLockError),

  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// What prepopulation did to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  /// The target existed beforehand and was not touched.
  AlreadyWarm { target: PathBuf },
  /// The target was created and filled from `source`.
  Warmed {
    target: PathBuf,
    source: Candidate,
    copied: CopyStats,
  },
  /// The target was created empty; no candidate existed.
  Cold { target: PathBuf },
}

impl Outcome {
  pub fn target(&self) -> &Path {
    match self {
      Outcome::AlreadyWarm { target } | Outcome::Warmed { target, .. } | Outcome::Cold { target } => target,
    }
  }
}

/// What prepopulation would do, computed without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
  pub target: PathBuf,
  pub already_warm: bool,
  pub source: Option<Candidate>,
}

pub fn plan(config: &CacheConfig) -> Result<Plan, CacheError> {
  config.validate()?;

  let already_warm = config.target.exists();
  let source = if already_warm {
    None
  } else {
    find_freshest(&config.kind_root(), &config.job_name, Some(&config.target))
  };

  Ok(Plan {
    target: config.target.clone(),
    already_warm,
    source,
  })
}

/// Warm-starts `config.target` from the freshest cache of the same job.
///
/// Holds the slot's [`CacheLock`] while creating and filling the target, so a
/// concurrent run of the same job waits and then finds the target warm. If
/// the copy fails the target is removed again, so a later run retries instead
/// of mistaking a partial copy for a warm cache.
pub fn prepopulate(config: &CacheConfig) -> Result<Outcome, CacheError> {
  config.validate()?;

  let target = &config.target;
  if target.exists() {
    info!(path = %target.display(), "No need to prepopulate {} cache", config.kind);
    return Ok(Outcome::AlreadyWarm { target: target.clone() });
  }

  let ref_dir = config.ref_dir();
  create_dir(&ref_dir)?;
  let _lock = CacheLock::acquire(&config.lock_path())?;

  // Another run of this job may have filled it while we waited for the lock.
  if target.exists() {
    info!(path = %target.display(), "No need to prepopulate {} cache", config.kind);
    return Ok(Outcome::AlreadyWarm { target: target.clone() });
  }

  create_dir(target)?;
  debug!(path = %target.display(), "created target directory");

  let kind_root = config.kind_root();
  let Some(source) = find_freshest(&kind_root, &config.job_name, Some(target)) else {
    info!(
      root = %kind_root.display(),
      job = %config.job_name,
      "No such {} dir, proceeding from scratch", config.kind
    );
    return Ok(Outcome::Cold { target: target.clone() });
  };

  info!(source = %source.path.display(), "Using {} to prepopulate the cache", source.path.display());

  let copied = fill_target(&source.path, target)?;
  info!(files = copied.files, bytes = copied.bytes, "cache prepopulated");
  Ok(Outcome::Warmed {
    target: target.clone(),
    source,
    copied,
  })
}

fn create_dir(dir: &Path) -> Result<(), CacheError> {
  fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
    path: dir.to_path_buf(),
    source,
  })
}

/// Copies `source` into `target`, a directory created by this run, and
/// removes `target` again if the copy fails.
fn fill_target(source: &Path, target: &Path) -> Result<CopyStats, CacheError> {
  copy_tree(source, target).inspect_err(|_| {
    if let Err(cleanup) = fs::remove_dir_all(target) {
      warn!(path = %target.display(), error = %cleanup, "failed to remove partially copied target");
    }
  })
}
