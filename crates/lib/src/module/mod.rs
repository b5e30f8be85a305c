//! Module builder.
//!
//! Turns a contract project into a deployable WebAssembly module:
//! 1. `compile`: `cargo +<toolchain> build --release` for `wasm32-unknown-unknown`
//! 2. `disassemble`: `wasm2wat` into `<name>.wat`
//! 3. `patch`: give the imported memory a maximum, written to `<name>-fixed.wat`
//! 4. `reassemble`: `wat2wasm` back into `<name>.wasm`
//! 5. `optimize`: `wasm-opt -O<level>` into `<name>-opt.wasm`
//! 6. `prune`: `wasm-prune` down to the configured exports, `<name>-pruned.wasm`
//!
//! Stages run strictly in order and the first failure stops the run.

pub mod patch;
pub mod tools;
pub mod types;

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ModuleConfig;
use crate::consts::WASM_TARGET;

pub use patch::patch_memory_import;
pub use tools::run_tool;
pub use types::{ModuleError, ModuleReport, PlannedStage, Stage, StageReport};

pub struct ModulePipeline {
  config: ModuleConfig,
}

impl ModulePipeline {
  pub fn new(config: ModuleConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &ModuleConfig {
    &self.config
  }

  /// The stages a run would execute, with their full command lines.
  pub fn plan(&self) -> Vec<PlannedStage> {
    Stage::ALL.iter().map(|stage| self.planned(*stage)).collect()
  }

  fn planned(&self, stage: Stage) -> PlannedStage {
    let c = &self.config;
    let tools = &c.tools;

    let wat = c.artifact("", "wat");
    let fixed = c.artifact("-fixed", "wat");
    let wasm = c.artifact("", "wasm");
    let opt = c.artifact("-opt", "wasm");
    let pruned = c.artifact("-pruned", "wasm");

    let tool = |program: &str, args: Vec<String>, input, output| PlannedStage {
      stage,
      program: Some(program.to_string()),
      args,
      env: Vec::new(),
      cwd: None,
      input,
      output,
    };

    match stage {
      Stage::Compile => {
        let mut args = vec![
          format!("+{}", c.toolchain),
          "build".to_string(),
          "--release".to_string(),
          format!("--target={}", WASM_TARGET),
        ];
        if !c.features.is_empty() {
          args.push("--features".to_string());
          args.push(c.features.join(","));
        }
        args.push("--verbose".to_string());

        PlannedStage {
          env: vec![
            ("CARGO_INCREMENTAL".to_string(), "0".to_string()),
            ("CARGO_TARGET_DIR".to_string(), path(&c.out_dir)),
          ],
          cwd: Some(c.project_dir.clone()),
          ..tool(&tools.cargo, args, c.project_dir.join("Cargo.toml"), c.compiled_wasm())
        }
      }
      Stage::Disassemble => {
        let input = c.compiled_wasm();
        tool(
          &tools.wasm2wat,
          vec!["-o".to_string(), path(&wat), path(&input)],
          input,
          wat,
        )
      }
      Stage::Patch => PlannedStage {
        stage,
        program: None,
        args: Vec::new(),
        env: Vec::new(),
        cwd: None,
        input: wat,
        output: fixed,
      },
      Stage::Reassemble => tool(
        &tools.wat2wasm,
        vec!["-o".to_string(), path(&wasm), path(&fixed)],
        fixed,
        wasm,
      ),
      Stage::Optimize => tool(
        &tools.wasm_opt,
        vec![format!("-O{}", c.opt_level), path(&wasm), "-o".to_string(), path(&opt)],
        wasm,
        opt,
      ),
      Stage::Prune => {
        let exports: Vec<&str> = c.exports.iter().map(String::as_str).filter(|e| !e.is_empty()).collect();
        tool(
          &tools.wasm_prune,
          vec!["--exports".to_string(), exports.join(","), path(&opt), path(&pruned)],
          opt,
          pruned,
        )
      }
    }
  }

  /// Runs every stage in order, stopping at the first failure.
  pub async fn run(&self) -> Result<ModuleReport, ModuleError> {
    self.config.validate()?;

    let out_dir = &self.config.out_dir;
    tokio::fs::create_dir_all(out_dir)
      .await
      .map_err(|source| ModuleError::Io {
        path: out_dir.clone(),
        source,
      })?;

    let plan = self.plan();
    self.clear_stale_outputs(&plan).await?;

    let mut stages = Vec::with_capacity(plan.len());
    for planned in &plan {
      let start = Instant::now();

      match planned.stage {
        Stage::Patch => self.patch(planned).await?,
        _ => {
          run_tool(planned).await?;
        }
      }

      if !tokio::fs::try_exists(&planned.output).await.unwrap_or(false) {
        return Err(ModuleError::MissingOutput {
          stage: planned.stage,
          path: planned.output.clone(),
        });
      }

      let elapsed = start.elapsed();
      debug!(stage = %planned.stage, elapsed_ms = elapsed.as_millis(), "stage complete");
      stages.push(StageReport {
        stage: planned.stage,
        output: planned.output.clone(),
        elapsed_ms: elapsed.as_millis(),
      });
    }

    let artifact = self.config.artifact("-pruned", "wasm");
    let artifact_bytes = tokio::fs::metadata(&artifact)
      .await
      .map_err(|source| ModuleError::Io {
        path: artifact.clone(),
        source,
      })?
      .len();

    info!(
      name = %self.config.name,
      artifact = %artifact.display(),
      bytes = artifact_bytes,
      "module built"
    );

    Ok(ModuleReport {
      name: self.config.name.clone(),
      artifact,
      artifact_bytes,
      stages,
    })
  }

  /// Removes outputs of a previous run so a failed stage never leaves an
  /// older artifact looking like the result of this one.
  ///
  /// The compiled module is left alone; cargo owns that directory.
  async fn clear_stale_outputs(&self, plan: &[PlannedStage]) -> Result<(), ModuleError> {
    for planned in plan.iter().filter(|p| p.stage != Stage::Compile) {
      match tokio::fs::remove_file(&planned.output).await {
        Ok(()) => debug!(path = %planned.output.display(), "removed stale output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
          return Err(ModuleError::Io {
            path: planned.output.clone(),
            source,
          });
        }
      }
    }
    Ok(())
  }

  async fn patch(&self, planned: &PlannedStage) -> Result<(), ModuleError> {
    info!(stage = %planned.stage, command = %planned.command_line(), "running in-process stage");

    let wat = tokio::fs::read_to_string(&planned.input)
      .await
      .map_err(|source| ModuleError::Io {
        path: planned.input.clone(),
        source,
      })?;

    let patched = patch_memory_import(&wat, self.config.memory_max_pages)?.ok_or_else(|| {
      ModuleError::MemoryImportNotFound {
        path: planned.input.clone(),
      }
    })?;

    tokio::fs::write(&planned.output, patched)
      .await
      .map_err(|source| ModuleError::Io {
        path: planned.output.clone(),
        source,
      })
  }
}

fn path(p: &Path) -> String {
  p.display().to_string()
}
