//! Shared test helpers for CLI integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Variables the binary falls back to; cleared so the host CI can't leak in.
const CI_VARS: &[&str] = &[
  "CI_PROJECT_NAME",
  "CI_COMMIT_REF_NAME",
  "CI_JOB_NAME",
  "CARGO_TARGET_DIR",
  "PREBAKE_CACHE_ROOT",
  "PREBAKE_CARGO",
  "PREBAKE_WASM2WAT",
  "PREBAKE_WAT2WASM",
  "PREBAKE_WASM_OPT",
  "PREBAKE_WASM_PRUNE",
];

pub fn prebake_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("prebake");
  for var in CI_VARS {
    cmd.env_remove(var);
  }
  cmd
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding a cache root and any
/// projects or fake tools it needs.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf())
  }

  pub fn cache_root(&self) -> PathBuf {
    self.path().join("ci-cache")
  }

  /// `<cache_root>/proj/targets/<ref>/<job>`
  pub fn job_dir(&self, ref_name: &str, job: &str) -> PathBuf {
    self.cache_root().join("proj").join("targets").join(ref_name).join(job)
  }

  /// Creates a job cache holding `release/marker` with `marker` as content,
  /// modified `secs` seconds after the epoch.
  pub fn seed_job(&self, ref_name: &str, job: &str, marker: &str, secs: u64) -> PathBuf {
    let dir = self.job_dir(ref_name, job);
    fs::create_dir_all(dir.join("release")).unwrap();
    fs::write(dir.join("release").join("marker"), marker).unwrap();
    fs::File::open(&dir)
      .unwrap()
      .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
      .unwrap();
    dir
  }

  /// `prebake cache` for the `proj` project, configured through flags.
  pub fn cache_cmd(&self, ref_name: &str, job: &str) -> Command {
    let mut cmd = prebake_cmd();
    cmd
      .arg("cache")
      .arg("--cache-root")
      .arg(self.cache_root())
      .args(["--project", "proj", "--ref-name", ref_name, "--job-name", job])
      .arg("--target")
      .arg(self.job_dir(ref_name, job));
    cmd
  }

  /// Writes a contract project with the given crate name.
  pub fn write_project(&self, name: &str) -> PathBuf {
    let dir = self.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
      dir.join("Cargo.toml"),
      format!("[package]\nname = \"{}\"\nversion = \"0.1.0\"\n", name),
    )
    .unwrap();
    dir
  }

  /// Installs shell-script stand-ins for cargo, wabt and binaryen.
  #[cfg(unix)]
  pub fn install_fake_tools(&self) -> PathBuf {
    let bin = self.path().join("bin");
    write_script(
      &bin,
      "cargo",
      r#"out="$CARGO_TARGET_DIR/wasm32-unknown-unknown/release"
mkdir -p "$out"
name=$(sed -n 's/^name = "\(.*\)"/\1/p' Cargo.toml | head -n 1 | tr '-' '_')
printf 'compiled' > "$out/$name.wasm""#,
    );
    write_script(
      &bin,
      "wasm2wat",
      r#"printf '(module\n  (import "env" "memory" (memory (;0;) 2))\n)\n' > "$2""#,
    );
    write_script(&bin, "wat2wasm", r#"cp "$3" "$2""#);
    write_script(&bin, "wasm-opt", r#"cp "$2" "$4""#);
    write_script(&bin, "wasm-prune", r#"cp "$3" "$4""#);
    bin
  }

  /// `prebake module` for `project` using the fake tools in `bin`.
  pub fn module_cmd(&self, project: &Path, bin: &Path) -> Command {
    let mut cmd = prebake_cmd();
    cmd
      .arg("module")
      .arg(project)
      .env("PREBAKE_CARGO", bin.join("cargo"))
      .env("PREBAKE_WASM2WAT", bin.join("wasm2wat"))
      .env("PREBAKE_WAT2WASM", bin.join("wat2wasm"))
      .env("PREBAKE_WASM_OPT", bin.join("wasm-opt"))
      .env("PREBAKE_WASM_PRUNE", bin.join("wasm-prune"));
    cmd
  }
}

/// Writes an executable `/bin/sh` script and returns its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  fs::create_dir_all(dir).unwrap();
  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/sh\nset -e\n{}\n", body)).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

pub fn modified_secs(path: &Path) -> u64 {
  fs::metadata(path)
    .unwrap()
    .modified()
    .unwrap_or(SystemTime::UNIX_EPOCH)
    .duration_since(UNIX_EPOCH)
    .unwrap()
    .as_secs()
}
