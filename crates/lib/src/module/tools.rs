//! External tool invocation.
//!
//! Each pipeline stage that shells out goes through [`run_tool`], which turns
//! a non-zero exit or a missing binary into a typed [`ModuleError`] so the
//! pipeline can stop at the first failure.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info};

use super::types::{ModuleError, PlannedStage};

/// Runs the program of a planned stage and waits for it to exit.
///
/// The child inherits the caller's environment with the stage's variables
/// layered on top. Its stderr is echoed to ours line by line as it runs, so
/// compiler warnings and progress stay visible. Returns the captured stdout,
/// trimmed.
pub async fn run_tool(planned: &PlannedStage) -> Result<String, ModuleError> {
  let Some(program) = planned.program.as_deref() else {
    return Ok(String::new());
  };

  info!(stage = %planned.stage, command = %planned.command_line(), "running tool");

  let mut command = Command::new(program);
  command
    .args(&planned.args)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  for (key, value) in &planned.env {
    command.env(key, value);
  }
  if let Some(cwd) = &planned.cwd {
    command.current_dir(cwd);
  }

  let spawn_err = |source: io::Error| {
    if source.kind() == io::ErrorKind::NotFound {
      ModuleError::ToolNotFound {
        stage: planned.stage,
        program: program.to_string(),
      }
    } else {
      ModuleError::Spawn {
        stage: planned.stage,
        program: program.to_string(),
        source,
      }
    }
  };

  let mut child = command.spawn().map_err(spawn_err)?;
  let stderr_pipe = child.stderr.take();
  let (output, stderr) = tokio::join!(child.wait_with_output(), forward_stderr(stderr_pipe));
  let output = output.map_err(spawn_err)?;

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !output.status.success() {
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "tool stdout");
    }
    return Err(ModuleError::ToolFailed {
      stage: planned.stage,
      program: program.to_string(),
      code: output.status.code(),
      stderr,
    });
  }

  Ok(stdout)
}

/// Copies the child's stderr to ours as it arrives and returns all of it.
async fn forward_stderr(pipe: Option<ChildStderr>) -> String {
  let Some(pipe) = pipe else {
    return String::new();
  };

  let mut reader = BufReader::new(pipe);
  let mut captured = String::new();
  let mut line = Vec::new();
  loop {
    line.clear();
    match reader.read_until(b'\n', &mut line).await {
      Ok(0) | Err(_) => break,
      Ok(_) => {
        let text = String::from_utf8_lossy(&line);
        eprint!("{}", text);
        captured.push_str(&text);
      }
    }
  }
  captured
}
