//! Implementation of the `prebake module` command.
//!
//! Builds a contract project into `<name>-pruned.wasm`, stopping at the
//! first stage that fails.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use prebake_lib::config::{ModuleConfig, Tools};
use prebake_lib::consts::DEFAULT_MEMORY_MAX_PAGES;
use prebake_lib::module::{ModulePipeline, ModuleReport, PlannedStage};

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_error, print_info, print_json, print_stat, print_step,
  print_success,
};

#[derive(Debug, Args)]
pub struct ModuleArgs {
  /// Contract project directory (containing Cargo.toml)
  #[arg(default_value = ".")]
  pub project: PathBuf,

  /// Module name; defaults to the crate name from Cargo.toml
  #[arg(long)]
  pub name: Option<String>,

  /// Directory for build artifacts; defaults to <PROJECT>/target
  #[arg(long)]
  pub out_dir: Option<PathBuf>,

  /// Rust toolchain passed to cargo as +<TOOLCHAIN>
  #[arg(long, default_value = "nightly")]
  pub toolchain: String,

  /// Cargo features to enable (comma separated)
  #[arg(long, value_delimiter = ',')]
  pub features: Vec<String>,

  /// Maximum pages of the imported memory
  #[arg(long, default_value_t = DEFAULT_MEMORY_MAX_PAGES)]
  pub memory_max: u32,

  /// Exports kept by wasm-prune (comma separated) [default: call,deploy]
  #[arg(long, value_delimiter = ',')]
  pub exports: Vec<String>,

  /// wasm-opt optimization level, passed as -O<LEVEL>
  #[arg(long, default_value = "z")]
  pub opt_level: String,

  /// cargo executable
  #[arg(long, env = "PREBAKE_CARGO", default_value = "cargo")]
  pub cargo: String,

  /// wasm2wat executable
  #[arg(long, env = "PREBAKE_WASM2WAT", default_value = "wasm2wat")]
  pub wasm2wat: String,

  /// wat2wasm executable
  #[arg(long, env = "PREBAKE_WAT2WASM", default_value = "wat2wasm")]
  pub wat2wasm: String,

  /// wasm-opt executable
  #[arg(long, env = "PREBAKE_WASM_OPT", default_value = "wasm-opt")]
  pub wasm_opt: String,

  /// wasm-prune executable
  #[arg(long, env = "PREBAKE_WASM_PRUNE", default_value = "wasm-prune")]
  pub wasm_prune: String,

  /// Print the stages that would run without running them
  #[arg(long)]
  pub dry_run: bool,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  pub output: OutputFormat,
}

impl ModuleArgs {
  fn config(self) -> Result<ModuleConfig> {
    let mut config = match self.name {
      Some(name) => ModuleConfig::new(&self.project, name),
      None => ModuleConfig::for_project(&self.project).context("Failed to determine module name")?,
    };

    if let Some(out_dir) = self.out_dir {
      config.out_dir = out_dir;
    }
    config.toolchain = self.toolchain;
    config.features = self.features;
    config.memory_max_pages = self.memory_max;
    if !self.exports.is_empty() {
      config.exports = self.exports;
    }
    config.opt_level = self.opt_level;
    config.tools = Tools {
      cargo: self.cargo,
      wasm2wat: self.wasm2wat,
      wat2wasm: self.wat2wasm,
      wasm_opt: self.wasm_opt,
      wasm_prune: self.wasm_prune,
    };

    Ok(config)
  }
}

pub fn cmd_module(args: ModuleArgs, verbose: bool) -> Result<()> {
  let dry_run = args.dry_run;
  let output = args.output;
  let config = args.config()?;
  debug!(?config, "module configuration");
  let pipeline = ModulePipeline::new(config);

  if dry_run {
    let plan = pipeline.plan();
    if output.is_json() {
      print_json(&plan)?;
    } else {
      print_plan(&plan);
    }
    return Ok(());
  }

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(pipeline.run());

  let report = match result {
    Ok(report) => report,
    Err(e) => {
      if !output.is_json() {
        let stage = e.stage().map(|s| s.as_str()).unwrap_or("setup");
        print_error(&format!("Module build failed at {}", stage));
      }
      return Err(e).context(format!("Failed to build module {}", pipeline.config().name));
    }
  };

  if output.is_json() {
    return print_json(&report);
  }

  print_report(&report, start.elapsed(), verbose);
  Ok(())
}

fn print_plan(plan: &[PlannedStage]) {
  print_info("Dry run - no stages executed");
  for planned in plan {
    print_step(planned.stage.as_str(), &planned.command_line());
  }
}

fn print_report(report: &ModuleReport, elapsed: Duration, verbose: bool) {
  println!();
  print_success(&format!("Module {} built", report.name));
  print_stat("Artifact", &report.artifact.display().to_string());
  print_stat("Size", &format_bytes(report.artifact_bytes));
  print_stat("Duration", &format_duration(elapsed));

  if verbose {
    for stage in &report.stages {
      let elapsed = Duration::from_millis(stage.elapsed_ms as u64);
      print_step(stage.stage.as_str(), &format_duration(elapsed));
    }
  }
}
