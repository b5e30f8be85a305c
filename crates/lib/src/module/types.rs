//! Types for the module pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// One step of the module pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Compile,
  Disassemble,
  Patch,
  Reassemble,
  Optimize,
  Prune,
}

impl Stage {
  pub const ALL: [Stage; 6] = [
    Stage::Compile,
    Stage::Disassemble,
    Stage::Patch,
    Stage::Reassemble,
    Stage::Optimize,
    Stage::Prune,
  ];

  pub const fn as_str(self) -> &'static str {
    match self {
      Stage::Compile => "compile",
      Stage::Disassemble => "disassemble",
      Stage::Patch => "patch",
      Stage::Reassemble => "reassemble",
      Stage::Optimize => "optimize",
      Stage::Prune => "prune",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors that abort the module pipeline.
#[derive(Debug, Error)]
pub enum ModuleError {
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),

  #[error("{stage}: {program} not found; is it installed and on PATH?")]
  ToolNotFound { stage: Stage, program: String },

  #[error("{stage}: failed to run {program}: {source}")]
  Spawn {
    stage: Stage,
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{stage}: {program} failed with exit code {code:?}{}", format_stderr(.stderr))]
  ToolFailed {
    stage: Stage,
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{stage}: expected output {path} was not produced")]
  MissingOutput { stage: Stage, path: PathBuf },

  #[error("no `(import \"env\" \"memory\" ...)` declaration found in {path}")]
  MemoryImportNotFound { path: PathBuf },

  #[error("memory import has unsupported limits `{limits}`; expected `<initial> [<maximum>]` pages")]
  UnsupportedMemoryImport { limits: String },

  #[error("memory import declares {initial} initial pages, more than the maximum of {max}")]
  MemoryLimits { initial: u32, max: u32 },

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ModuleError {
  /// The stage the error was raised in, when it came from one.
  pub fn stage(&self) -> Option<Stage> {
    match self {
      ModuleError::ToolNotFound { stage, .. }
      | ModuleError::Spawn { stage, .. }
      | ModuleError::ToolFailed { stage, .. }
      | ModuleError::MissingOutput { stage, .. } => Some(*stage),
      ModuleError::MemoryImportNotFound { .. }
      | ModuleError::UnsupportedMemoryImport { .. }
      | ModuleError::MemoryLimits { .. } => Some(Stage::Patch),
      ModuleError::Config(_) | ModuleError::Io { .. } => None,
    }
  }
}

fn format_stderr(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{}", trimmed)
  }
}

/// A stage as it will be executed.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
  pub stage: Stage,
  /// `None` for stages performed in-process.
  pub program: Option<String>,
  pub args: Vec<String>,
  pub env: Vec<(String, String)>,
  pub cwd: Option<PathBuf>,
  pub input: PathBuf,
  pub output: PathBuf,
}

impl PlannedStage {
  /// Shell-like rendering for logs and dry runs.
  pub fn command_line(&self) -> String {
    match &self.program {
      Some(program) => {
        let mut parts: Vec<String> = self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        parts.push(program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
      }
      None => format!(
        "patch memory import {} -> {}",
        self.input.display(),
        self.output.display()
      ),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
  pub stage: Stage,
  pub output: PathBuf,
  pub elapsed_ms: u128,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
  pub name: String,
  pub artifact: PathBuf,
  pub artifact_bytes: u64,
  pub stages: Vec<StageReport>,
}
