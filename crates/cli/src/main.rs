use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{CacheArgs, ModuleArgs};

/// prebake - contract module builds and CI cache warm-starts
#[derive(Parser)]
#[command(name = "prebake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile a contract to wasm, patch its memory import, optimize and prune it
  Module(ModuleArgs),

  /// Seed this branch's job cache from the freshest cache of the same job
  Cache(CacheArgs),

  /// Show version and defaults
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Module(args) => cmd::cmd_module(args, cli.verbose),
    Commands::Cache(args) => cmd::cmd_cache(args),
    Commands::Info => {
      cmd::cmd_info();
      Ok(())
    }
  }
}
