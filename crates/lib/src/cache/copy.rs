//! Recursive directory copy.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use super::CacheError;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CopyStats {
  pub files: usize,
  pub dirs: usize,
  pub symlinks: usize,
  pub bytes: u64,
}

/// Copies the contents of `from` into the existing directory `to`.
///
/// Regular files keep their permission bits. Symlinks are recreated pointing
/// at the same target rather than followed. Other special files are skipped.
pub fn copy_tree(from: &Path, to: &Path) -> Result<CopyStats, CacheError> {
  let mut stats = CopyStats::default();

  let walker = WalkDir::new(from).min_depth(1).follow_links(false).sort_by_file_name();

  for entry in walker {
    let entry = entry.map_err(|e| CacheError::Walk {
      path: from.to_path_buf(),
      message: e.to_string(),
    })?;
    let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let dest = to.join(rel);
    let file_type = entry.file_type();

    let copy_err = |source: io::Error| CacheError::Copy {
      from: entry.path().to_path_buf(),
      to: dest.clone(),
      source,
    };

    if file_type.is_dir() {
      fs::create_dir_all(&dest).map_err(copy_err)?;
      stats.dirs += 1;
    } else if file_type.is_file() {
      stats.bytes += fs::copy(entry.path(), &dest).map_err(copy_err)?;
      stats.files += 1;
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(copy_err)?;
      create_symlink(&target, &dest, entry.path()).map_err(copy_err)?;
      stats.symlinks += 1;
    } else {
      debug!(path = %entry.path().display(), "skipping special file");
    }
  }

  debug!(
    from = %from.display(),
    to = %to.display(),
    files = stats.files,
    dirs = stats.dirs,
    bytes = stats.bytes,
    "copied tree"
  );

  Ok(stats)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path, _original: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path, original: &Path) -> io::Result<()> {
  if fs::metadata(original).map(|m| m.is_dir()).unwrap_or(false) {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}
