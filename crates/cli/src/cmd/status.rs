use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use gantry_lib::cache::lock::{CacheLock, LockMode};
use gantry_lib::cache::{BuildCache, CacheSummary};
use gantry_lib::config::ProjectConfig;
use gantry_lib::request::CacheOverrides;
use gantry_lib::util::hash::Fingerprint;

use crate::output::{OutputFormat, fingerprint_label, format_bytes, print_info, print_json, print_stat, print_warning, yes_no};

#[derive(Serialize)]
struct StatusReport {
  service: String,
  runtime: String,
  dependencies_enabled: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  build: Option<BuildStatus>,
}

#[derive(Serialize)]
struct BuildStatus {
  abi_tag: String,
  image: String,
  manifest: PathBuf,
  fingerprint: Fingerprint,
  rebuild_needed: bool,
  install_dir: PathBuf,
  cache: CacheSummary,
}

fn build_status(config: &ProjectConfig, project: &Path) -> Result<BuildStatus> {
  let request = config
    .to_request(project, CacheOverrides::default())
    .context("Invalid dependency configuration")?;
  let cache = BuildCache::for_request(&request);

  // Don't create a cache root just to look at it.
  let _lock = if cache.root().is_dir() {
    Some(CacheLock::acquire(cache.root(), LockMode::Shared, "status").context("Failed to lock dependency cache")?)
  } else {
    None
  };

  let fingerprint = Fingerprint::of_file(request.manifest_path())
    .with_context(|| format!("Failed to read {}", request.manifest_path().display()))?;
  let summary = cache.summary().context("Failed to read dependency cache")?;

  Ok(BuildStatus {
    abi_tag: request.runtime().abi_tag().to_string(),
    image: request.image().to_string(),
    manifest: request.manifest_path().to_path_buf(),
    rebuild_needed: summary.marker.as_ref() != Some(&fingerprint),
    fingerprint,
    install_dir: request.install_path(),
    cache: summary,
  })
}

pub fn cmd_status(project: &Path, output: OutputFormat) -> Result<()> {
  let config = ProjectConfig::load(project).context("Failed to load project config")?;

  let build = match config.enabled_dependencies() {
    Some(_) => Some(build_status(&config, project)?),
    None => None,
  };

  let report = StatusReport {
    service: config.function.name.clone(),
    runtime: config.function.runtime.clone(),
    dependencies_enabled: build.is_some(),
    build,
  };

  if output.is_json() {
    return print_json(&report);
  }

  print_info(&format!("Dependency status for {}", report.service));
  print_stat("Runtime", &report.runtime);
  print_stat("Dependencies", if report.dependencies_enabled { "enabled" } else { "disabled" });

  let Some(build) = &report.build else {
    return Ok(());
  };

  print_stat("ABI tag", &build.abi_tag);
  print_stat("Image", &build.image);
  print_stat("Manifest", &build.manifest.display().to_string());
  print_stat("Fingerprint", build.fingerprint.short());
  print_stat("Cache", &build.cache.root.display().to_string());
  print_stat("Cached build", fingerprint_label(build.cache.marker.as_ref()));
  print_stat("Artifacts", &build.cache.artifacts.to_string());
  print_stat("Cache size", &format_bytes(build.cache.bytes));
  print_stat("Install dir", &build.install_dir.display().to_string());
  print_stat("Rebuild needed", yes_no(build.rebuild_needed));

  if build.rebuild_needed && build.cache.marker.is_some() {
    print_warning("Dependency manifest changed since the last build");
  }

  Ok(())
}
