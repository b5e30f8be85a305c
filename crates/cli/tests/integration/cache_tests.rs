#![cfg(unix)]

use std::fs;

use predicates::prelude::*;
use serial_test::serial;

use super::common::{TestEnv, modified_secs};

#[test]
#[serial]
fn warms_from_freshest_branch() {
  let env = TestEnv::new();
  env.seed_job("branch-old", "jobA", "old", 1_000);
  let newest = env.seed_job("branch-new", "jobA", "new", 2_000);

  env
    .cache_cmd("branch-current", "jobA")
    .assert()
    .success()
    .stdout(predicate::str::contains(format!(
      "Using {} to prepopulate the cache",
      newest.display()
    )));

  let target = env.job_dir("branch-current", "jobA");
  assert_eq!(
    fs::read_to_string(target.join("release").join("marker")).unwrap(),
    "new"
  );
}

#[test]
#[serial]
fn existing_target_is_not_modified() {
  let env = TestEnv::new();
  env.seed_job("branch-new", "jobA", "new", 2_000);
  let target = env.seed_job("branch-current", "jobA", "mine", 500);

  env
    .cache_cmd("branch-current", "jobA")
    .assert()
    .success()
    .stdout(predicate::str::contains("No need to prepopulate targets cache"));

  assert_eq!(
    fs::read_to_string(target.join("release").join("marker")).unwrap(),
    "mine"
  );
  assert_eq!(modified_secs(&target), 500);
}

#[test]
#[serial]
fn no_candidates_creates_empty_target() {
  let env = TestEnv::new();
  env.seed_job("master", "other-job", "x", 1_000);

  env
    .cache_cmd("branch-current", "jobA")
    .assert()
    .success()
    .stdout(predicate::str::contains("proceeding from scratch"));

  let target = env.job_dir("branch-current", "jobA");
  assert!(target.is_dir());
  assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
}

#[test]
#[serial]
fn reads_identifiers_from_ci_environment() {
  let env = TestEnv::new();
  env.seed_job("master", "test-linux", "from-master", 1_000);
  let target = env.job_dir("feature-x", "test-linux");

  super::common::prebake_cmd()
    .arg("cache")
    .env("PREBAKE_CACHE_ROOT", env.cache_root())
    .env("CI_PROJECT_NAME", "proj")
    .env("CI_COMMIT_REF_NAME", "feature-x")
    .env("CI_JOB_NAME", "test-linux")
    .env("CARGO_TARGET_DIR", &target)
    .assert()
    .success();

  assert_eq!(
    fs::read_to_string(target.join("release").join("marker")).unwrap(),
    "from-master"
  );
}

#[test]
#[serial]
fn dry_run_changes_nothing() {
  let env = TestEnv::new();
  let newest = env.seed_job("master", "jobA", "m", 1_000);

  env
    .cache_cmd("branch-current", "jobA")
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains(newest.display().to_string()));

  assert!(!env.job_dir("branch-current", "jobA").exists());
}

#[test]
#[serial]
fn json_output_is_valid() {
  let env = TestEnv::new();
  env.seed_job("master", "jobA", "m", 1_000);

  let output = env
    .cache_cmd("branch-current", "jobA")
    .args(["-o", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["outcome"], "warmed");
  assert_eq!(json["copied"]["files"], 1);
  assert_eq!(json["source"]["modified"], 1_000);
}

#[test]
#[serial]
fn invalid_ref_name_fails() {
  let env = TestEnv::new();

  env
    .cache_cmd("../escape", "jobA")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("single path segment"));
}
