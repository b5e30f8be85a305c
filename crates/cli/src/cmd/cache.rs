//! Implementation of the `prebake cache` command.
//!
//! Seeds `CARGO_TARGET_DIR` for the current branch and job from the most
//! recently modified cache of the same job on any branch.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use prebake_lib::cache::{self, Outcome, Plan};
use prebake_lib::config::CacheConfig;
use prebake_lib::consts::{DEFAULT_CACHE_KIND, DEFAULT_CACHE_ROOT};

use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

#[derive(Debug, Args)]
pub struct CacheArgs {
  /// Top-level cache directory
  #[arg(long, env = "PREBAKE_CACHE_ROOT", default_value = DEFAULT_CACHE_ROOT)]
  pub cache_root: PathBuf,

  /// Project segment of the cache layout
  #[arg(long, env = "CI_PROJECT_NAME")]
  pub project: String,

  /// Cache type segment of the cache layout
  #[arg(long, default_value = DEFAULT_CACHE_KIND)]
  pub kind: String,

  /// Branch or tag the job runs for
  #[arg(long, env = "CI_COMMIT_REF_NAME")]
  pub ref_name: String,

  /// Name of the CI job; candidates must carry the same name
  #[arg(long, env = "CI_JOB_NAME")]
  pub job_name: String,

  /// Directory to warm
  #[arg(long, env = "CARGO_TARGET_DIR")]
  pub target: PathBuf,

  /// Show which cache would be used without creating or copying anything
  #[arg(long)]
  pub dry_run: bool,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  pub output: OutputFormat,
}

impl CacheArgs {
  fn config(&self) -> CacheConfig {
    CacheConfig::new(
      &self.cache_root,
      &self.project,
      &self.ref_name,
      &self.job_name,
      &self.target,
    )
    .with_kind(&self.kind)
  }
}

pub fn cmd_cache(args: CacheArgs) -> Result<()> {
  let config = args.config();
  debug!(?config, "cache configuration");

  if args.dry_run {
    let plan = cache::plan(&config).context("Failed to inspect cache")?;
    if args.output.is_json() {
      print_json(&plan)?;
    } else {
      print_plan(&plan, &config);
    }
    return Ok(());
  }

  let start = Instant::now();
  let outcome = cache::prepopulate(&config).context("Failed to prepopulate cache")?;

  if args.output.is_json() {
    return print_json(&outcome);
  }

  match &outcome {
    Outcome::AlreadyWarm { target } => {
      print_info(&format!("No need to prepopulate {} cache", config.kind));
      print_stat("Target", &target.display().to_string());
    }
    Outcome::Warmed { target, source, copied } => {
      print_success(&format!("Using {} to prepopulate the cache", source.path.display()));
      print_stat("Target", &target.display().to_string());
      print_stat("Files", &copied.files.to_string());
      print_stat("Size", &format_bytes(copied.bytes));
      print_stat("Duration", &format_duration(start.elapsed()));
    }
    Outcome::Cold { target } => {
      print_info(&format!("No such {} dir, proceeding from scratch", config.kind));
      print_stat("Target", &target.display().to_string());
    }
  }

  Ok(())
}

fn print_plan(plan: &Plan, config: &CacheConfig) {
  print_info("Dry run - no changes made");
  print_stat("Target", &plan.target.display().to_string());
  if plan.already_warm {
    print_stat("Action", &format!("none, {} cache already exists", config.kind));
  } else if let Some(source) = &plan.source {
    print_stat("Action", &format!("copy from {}", source.path.display()));
  } else {
    print_stat("Action", "create empty target");
  }
}
