//! Selection of the cache directory to warm-start from.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A job cache from some branch that could seed the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
  pub path: PathBuf,
  #[serde(with = "unix_seconds")]
  pub modified: SystemTime,
}

/// Finds the most recently modified `<kind_root>/*/<job_name>` directory.
///
/// Only directories exactly two levels below `kind_root` are considered.
/// `exclude` is the directory being warmed: it is never selected, and neither
/// is any candidate containing it. Entries that
/// cannot be read are skipped. Equal timestamps go to the lexicographically
/// smallest path.
pub fn find_freshest(kind_root: &Path, job_name: &str, exclude: Option<&Path>) -> Option<Candidate> {
  let mut best: Option<Candidate> = None;

  let walker = WalkDir::new(kind_root)
    .min_depth(2)
    .max_depth(2)
    .follow_links(false)
    .sort_by_file_name();

  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        debug!(error = %e, "skipping unreadable cache entry");
        continue;
      }
    };

    if !entry.file_type().is_dir() || entry.file_name() != job_name {
      continue;
    }
    if exclude.is_some_and(|excluded| contains(entry.path(), excluded)) {
      continue;
    }

    let modified = match entry.metadata() {
      Ok(metadata) => match metadata.modified() {
        Ok(modified) => modified,
        Err(e) => {
          warn!(path = %entry.path().display(), error = %e, "cannot read modification time");
          continue;
        }
      },
      Err(e) => {
        warn!(path = %entry.path().display(), error = %e, "cannot read metadata");
        continue;
      }
    };

    debug!(path = %entry.path().display(), ?modified, "found candidate");

    let newer = match &best {
      None => true,
      Some(current) => modified > current.modified,
    };
    if newer {
      best = Some(Candidate {
        path: entry.into_path(),
        modified,
      });
    }
  }

  best
}

/// Whether `inner` is `outer` or lies beneath it, resolving symlinks when
/// both paths exist.
fn contains(outer: &Path, inner: &Path) -> bool {
  if inner.starts_with(outer) {
    return true;
  }
  match (outer.canonicalize(), inner.canonicalize()) {
    (Ok(outer), Ok(inner)) => inner.starts_with(outer),
    _ => false,
  }
}

mod unix_seconds {
  use std::time::{SystemTime, UNIX_EPOCH};

  use serde::Serializer;

  pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let secs = time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    serializer.serialize_u64(secs)
  }
}
