//! Explicit configuration for the module pipeline and the cache prepopulator.
//!
//! Everything a CI job normally hands over through environment variables is
//! carried here as named fields. The CLI is responsible for filling them in
//! (from flags or their env fallbacks); the library never reads `std::env`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_CACHE_KIND, DEFAULT_EXPORTS, DEFAULT_MEMORY_MAX_PAGES, WASM_TARGET};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{field} must not be empty")]
  Empty { field: &'static str },

  #[error("{field} must be a single path segment, got {value:?}")]
  NotASegment { field: &'static str, value: String },

  #[error("{field} must be greater than zero")]
  Zero { field: &'static str },

  #[error("failed to read {path}: {source}")]
  ReadManifest {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {message}")]
  ParseManifest { path: PathBuf, message: String },

  #[error("{path} has no [package] name")]
  MissingPackageName { path: PathBuf },
}

/// Rejects values that would escape their slot in the cache layout.
fn validate_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
  if value.is_empty() {
    return Err(ConfigError::Empty { field });
  }
  if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
    return Err(ConfigError::NotASegment {
      field,
      value: value.to_string(),
    });
  }
  Ok(())
}

/// Inputs of the cache prepopulator.
///
/// The cache layout is `<cache_root>/<project>/<kind>/<ref_name>/<job_name>`.
/// `target` is normally that last path, but it is supplied separately (CI
/// exports it as `CARGO_TARGET_DIR`) and is taken as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
  pub cache_root: PathBuf,
  pub project: String,
  pub kind: String,
  pub ref_name: String,
  pub job_name: String,
  pub target: PathBuf,
}

impl CacheConfig {
  pub fn new(
    cache_root: impl Into<PathBuf>,
    project: impl Into<String>,
    ref_name: impl Into<String>,
    job_name: impl Into<String>,
    target: impl Into<PathBuf>,
  ) -> Self {
    Self {
      cache_root: cache_root.into(),
      project: project.into(),
      kind: DEFAULT_CACHE_KIND.to_string(),
      ref_name: ref_name.into(),
      job_name: job_name.into(),
      target: target.into(),
    }
  }

  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = kind.into();
    self
  }

  /// Directory holding every branch's caches of this kind.
  pub fn kind_root(&self) -> PathBuf {
    self.cache_root.join(&self.project).join(&self.kind)
  }

  /// Directory holding this branch's per-job caches.
  pub fn ref_dir(&self) -> PathBuf {
    self.kind_root().join(&self.ref_name)
  }

  /// Lock file guarding this branch and job's slot, kept beside the slot.
  pub fn lock_path(&self) -> PathBuf {
    self.ref_dir().join(format!(".{}.lock", self.job_name))
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.cache_root.as_os_str().is_empty() {
      return Err(ConfigError::Empty { field: "cache root" });
    }
    validate_segment("project", &self.project)?;
    validate_segment("kind", &self.kind)?;
    validate_segment("ref name", &self.ref_name)?;
    validate_segment("job name", &self.job_name)?;
    if self.target.as_os_str().is_empty() {
      return Err(ConfigError::Empty { field: "target" });
    }
    Ok(())
  }
}

/// External programs used by the module pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tools {
  pub cargo: String,
  pub wasm2wat: String,
  pub wat2wasm: String,
  pub wasm_opt: String,
  pub wasm_prune: String,
}

impl Default for Tools {
  fn default() -> Self {
    Self {
      cargo: "cargo".to_string(),
      wasm2wat: "wasm2wat".to_string(),
      wat2wasm: "wat2wasm".to_string(),
      wasm_opt: "wasm-opt".to_string(),
      wasm_prune: "wasm-prune".to_string(),
    }
  }
}

/// Inputs of the module pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
  pub project_dir: PathBuf,
  /// Crate name as it appears in the compiled artifact (underscores, not dashes).
  pub name: String,
  pub out_dir: PathBuf,
  pub toolchain: String,
  pub features: Vec<String>,
  pub memory_max_pages: u32,
  pub exports: Vec<String>,
  pub opt_level: String,
  pub tools: Tools,
}

impl ModuleConfig {
  /// Configuration with defaults for everything but the project and crate name.
  pub fn new(project_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
    let project_dir = project_dir.into();
    Self {
      out_dir: project_dir.join("target"),
      project_dir,
      name: name.into(),
      toolchain: "nightly".to_string(),
      features: Vec::new(),
      memory_max_pages: DEFAULT_MEMORY_MAX_PAGES,
      exports: DEFAULT_EXPORTS.iter().map(|s| s.to_string()).collect(),
      opt_level: "z".to_string(),
      tools: Tools::default(),
    }
  }

  /// Configuration for the project at `project_dir`, naming the module after
  /// the crate declared in its `Cargo.toml`.
  pub fn for_project(project_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let project_dir = project_dir.into();
    let name = crate_name(&project_dir.join("Cargo.toml"))?;
    Ok(Self::new(project_dir, name))
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    validate_segment("module name", &self.name)?;
    if self.toolchain.is_empty() {
      return Err(ConfigError::Empty { field: "toolchain" });
    }
    if self.exports.iter().all(|e| e.is_empty()) {
      return Err(ConfigError::Empty { field: "exports" });
    }
    if self.memory_max_pages == 0 {
      return Err(ConfigError::Zero {
        field: "memory max pages",
      });
    }
    if self.opt_level.is_empty() {
      return Err(ConfigError::Empty { field: "opt level" });
    }
    Ok(())
  }

  /// Module emitted by cargo.
  pub fn compiled_wasm(&self) -> PathBuf {
    self
      .out_dir
      .join(WASM_TARGET)
      .join("release")
      .join(format!("{}.wasm", self.name))
  }

  pub fn artifact(&self, suffix: &str, ext: &str) -> PathBuf {
    self.out_dir.join(format!("{}{}.{}", self.name, suffix, ext))
  }
}

/// Reads the library name cargo will give the compiled artifact.
///
/// `[lib] name` wins over `[package] name`; dashes become underscores.
pub fn crate_name(manifest: &Path) -> Result<String, ConfigError> {
  let content = fs::read_to_string(manifest).map_err(|source| ConfigError::ReadManifest {
    path: manifest.to_path_buf(),
    source,
  })?;
  let doc: toml::Table = toml::from_str(&content).map_err(|e| ConfigError::ParseManifest {
    path: manifest.to_path_buf(),
    message: e.to_string(),
  })?;

  let lookup = |section: &str| {
    doc
      .get(section)
      .and_then(|s| s.get("name"))
      .and_then(|n| n.as_str())
      .map(str::to_string)
  };

  lookup("lib")
    .or_else(|| lookup("package"))
    .map(|name| name.replace('-', "_"))
    .ok_or_else(|| ConfigError::MissingPackageName {
      path: manifest.to_path_buf(),
    })
}
