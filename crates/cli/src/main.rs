mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildDepsOptions;
use crate::output::{OutputFormat, print_error};

/// gantry - build serverless function dependencies in runtime-matched containers
#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Show progress logs
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Show debug logs
  #[arg(long, global = true)]
  debug: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build (if needed) and install a project's dependencies
  BuildDeps {
    /// Project directory containing gantry.yml
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Rebuild even when the cache is up to date (also FORCE_DEPS_REBUILD=true)
    #[arg(long)]
    force_rebuild: bool,

    /// Empty the dependency cache before deciding (also FORCE_DEPS_CLEANUP=true)
    #[arg(long)]
    force_cleanup: bool,

    /// Maximum time to wait for a container (e.g. "45m", "2h")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the cache state of a project's dependencies
  Status {
    /// Project directory containing gantry.yml
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove stale dependency caches
  Prune {
    /// Directory holding one cache per service (default: the user cache directory)
    #[arg(long)]
    base: Option<PathBuf>,

    /// Remove caches last built longer ago than this (e.g. "30d", "2w")
    #[arg(long, value_parser = humantime::parse_duration)]
    older_than: Option<Duration>,

    /// Preview what would be removed without removing anything
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: bool, debug: bool) {
  let default = if debug {
    "debug"
  } else if verbose {
    "info"
  } else {
    "warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::BuildDeps {
      project,
      force_rebuild,
      force_cleanup,
      timeout,
      output,
    } => cmd::cmd_build_deps(BuildDepsOptions {
      project,
      force_rebuild,
      force_cleanup,
      timeout,
      output,
    }),
    Commands::Status { project, output } => cmd::cmd_status(&project, output),
    Commands::Prune {
      base,
      older_than,
      dry_run,
      output,
    } => cmd::cmd_prune(base, older_than, dry_run, output),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.debug);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
