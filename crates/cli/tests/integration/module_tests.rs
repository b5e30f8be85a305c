#![cfg(unix)]

use std::fs;

use predicates::prelude::*;
use serial_test::serial;

use super::common::{TestEnv, write_script};

#[test]
#[serial]
fn builds_pruned_module() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");
  let bin = env.install_fake_tools();

  env
    .module_cmd(&project, &bin)
    .assert()
    .success()
    .stdout(predicate::str::contains("Module flipper built"));

  let pruned = project.join("target").join("flipper-pruned.wasm");
  let content = fs::read_to_string(pruned).unwrap();
  assert!(content.contains(r#"(import "env" "memory" (memory (;0;) 2 16))"#));
}

#[test]
#[serial]
fn dashed_crate_name_uses_underscores() {
  let env = TestEnv::new();
  let project = env.write_project("multisig-plain");
  let bin = env.install_fake_tools();

  env.module_cmd(&project, &bin).assert().success();

  assert!(project.join("target").join("multisig_plain-pruned.wasm").exists());
}

#[test]
#[serial]
fn memory_max_flag_is_applied() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");
  let bin = env.install_fake_tools();

  env
    .module_cmd(&project, &bin)
    .args(["--memory-max", "32"])
    .assert()
    .success();

  let content = fs::read_to_string(project.join("target").join("flipper-pruned.wasm")).unwrap();
  assert!(content.contains("(memory (;0;) 2 32)"));
}

#[test]
#[serial]
fn optimizer_failure_aborts_without_pruned_module() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");
  let bin = env.install_fake_tools();
  let failing = write_script(&bin, "broken-wasm-opt", "echo 'wasm-opt: bad input' >&2\nexit 4");

  env
    .module_cmd(&project, &bin)
    .env("PREBAKE_WASM_OPT", &failing)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Module build failed at optimize"))
    .stderr(predicate::str::contains("exit code Some(4)"))
    .stderr(predicate::str::contains("wasm-opt: bad input"));

  assert!(!project.join("target").join("flipper-pruned.wasm").exists());
  assert!(project.join("target").join("flipper-fixed.wat").exists());
}

#[test]
#[serial]
fn compiler_warnings_reach_stderr_on_success() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");
  let bin = env.install_fake_tools();
  let noisy = write_script(
    &bin,
    "noisy-cargo",
    &format!(
      "echo 'warning: unused variable: `x`' >&2\nexec \"{}\" \"$@\"",
      bin.join("cargo").display()
    ),
  );

  env
    .module_cmd(&project, &bin)
    .env("PREBAKE_CARGO", &noisy)
    .assert()
    .success()
    .stderr(predicate::str::contains("warning: unused variable: `x`"));
}

#[test]
#[serial]
fn dry_run_lists_stages() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");

  prebake_dry_run(&env, &project)
    .assert()
    .success()
    .stdout(predicate::str::contains("compile"))
    .stdout(predicate::str::contains("+nightly build --release --target=wasm32-unknown-unknown"))
    .stdout(predicate::str::contains("--exports call,deploy"));

  assert!(!project.join("target").exists());
}

#[test]
#[serial]
fn dry_run_json_lists_six_stages() {
  let env = TestEnv::new();
  let project = env.write_project("flipper");

  let output = prebake_dry_run(&env, &project).args(["-o", "json"]).output().unwrap();

  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let stages: Vec<_> = json
    .as_array()
    .unwrap()
    .iter()
    .map(|s| s["stage"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(
    stages,
    vec!["compile", "disassemble", "patch", "reassemble", "optimize", "prune"]
  );
}

fn prebake_dry_run(env: &TestEnv, project: &std::path::Path) -> assert_cmd::Command {
  let mut cmd = env.module_cmd(project, &env.path().join("bin"));
  cmd.arg("--dry-run");
  cmd
}
