use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use gantry_lib::cache::prune::{DEFAULT_MAX_AGE, prune};
use gantry_lib::platform::paths::wheelhouse_dir;

use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_prune(base: Option<PathBuf>, older_than: Option<Duration>, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let base = base.unwrap_or_else(wheelhouse_dir);
  let max_age = older_than.unwrap_or(DEFAULT_MAX_AGE);

  let result = prune(&base, max_age, dry_run).context("Failed to prune dependency caches")?;

  if output.is_json() {
    return print_json(&result);
  }

  if dry_run {
    print_info("Dry run - no changes made");
    for path in &result.removed_paths {
      println!("  would remove {}", path.display());
    }
  } else {
    print_success("Prune complete");
  }

  print_stat("Base", &base.display().to_string());
  print_stat("Older than", &humantime::format_duration(max_age).to_string());
  print_stat("Scanned", &result.stats.scanned.to_string());
  print_stat(
    if dry_run { "Would remove" } else { "Removed" },
    &result.stats.removed.to_string(),
  );
  if result.stats.skipped_locked > 0 {
    print_stat("Skipped (in use)", &result.stats.skipped_locked.to_string());
  }
  if result.stats.skipped_foreign > 0 {
    print_stat("Skipped (not a cache)", &result.stats.skipped_foreign.to_string());
  }
  print_stat("Space freed", &format_bytes(result.stats.bytes_freed));
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
