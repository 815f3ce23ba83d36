//! `gantry build-deps`: build and install a project's dependencies.
//!
//! Operator overrides and the CI log directory are read from the environment
//! here, once, and passed down explicitly.

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use gantry_lib::config::ProjectConfig;
use gantry_lib::consts::{CI_ARTIFACTS_ENV, CI_MARKER_ENV, DEFAULT_BUILD_TIMEOUT, FORCE_CLEANUP_ENV, FORCE_REBUILD_ENV};
use gantry_lib::deps::{DependencyBuilder, WaitPolicy};
use gantry_lib::engine::docker::DockerCli;
use gantry_lib::request::CacheOverrides;

use crate::output::{
  OutputFormat, format_duration, print_info, print_json, print_leftovers, print_stat, print_success, yes_no,
};

pub struct BuildDepsOptions {
  pub project: PathBuf,
  pub force_rebuild: bool,
  pub force_cleanup: bool,
  pub timeout: Option<Duration>,
  pub output: OutputFormat,
}

/// Flags win; otherwise `FORCE_DEPS_REBUILD` / `FORCE_DEPS_CLEANUP` set to
/// exactly `true` enable the override.
fn resolve_overrides(force_rebuild: bool, force_cleanup: bool) -> CacheOverrides {
  let from_env = CacheOverrides::from_values(
    env::var(FORCE_REBUILD_ENV).ok().as_deref(),
    env::var(FORCE_CLEANUP_ENV).ok().as_deref(),
  );
  CacheOverrides {
    force_rebuild: force_rebuild || from_env.force_rebuild,
    force_cleanup: force_cleanup || from_env.force_cleanup,
  }
}

fn resolve_log_dir() -> PathBuf {
  WaitPolicy::ci_log_dir(
    env::var_os(CI_MARKER_ENV).is_some(),
    env::var_os(CI_ARTIFACTS_ENV).map(PathBuf::from),
  )
}

pub fn cmd_build_deps(opts: BuildDepsOptions) -> Result<()> {
  let start = Instant::now();

  let config = ProjectConfig::load(&opts.project).context("Failed to load project config")?;

  if config.enabled_dependencies().is_none() {
    info!(service = %config.function.name, "dependency build not enabled");
    if opts.output.is_json() {
      print_json(&serde_json::json!({ "service": config.function.name, "skipped": true }))?;
    } else {
      print_info(&format!(
        "Dependency build not enabled for {}, nothing to do",
        config.function.name
      ));
    }
    return Ok(());
  }

  let overrides = resolve_overrides(opts.force_rebuild, opts.force_cleanup);
  let request = config
    .to_request(&opts.project, overrides)
    .context("Invalid dependency configuration")?;

  let timeout = match opts.timeout {
    Some(timeout) => timeout,
    None => config.timeout()?.unwrap_or(DEFAULT_BUILD_TIMEOUT),
  };
  let policy = WaitPolicy {
    timeout,
    log_dir: resolve_log_dir(),
    ..WaitPolicy::default()
  };

  let engine = DockerCli::new(&config.engine);
  let report = DependencyBuilder::new(&engine)
    .wait_policy(policy)
    .run(&request)
    .with_context(|| format!("Failed to build dependencies for {}", request.service_name()))?;

  print_leftovers(&report);

  if opts.output.is_json() {
    print_json(&report)?;
  } else {
    print_success(&format!("Dependencies installed for {}", report.service));
    print_stat("Fingerprint", report.fingerprint.short());
    print_stat("Rebuilt", yes_no(report.rebuilt));
    print_stat("Install dir", &report.install_dir.display().to_string());
    print_stat("Packages", &report.installed.to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
