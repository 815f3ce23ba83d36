//! Eviction of stale cache roots.
//!
//! Builds never delete old artifacts on their own. `prune` walks the
//! per-service cache roots under a wheelhouse base directory and removes the
//! ones whose last successful build is older than a threshold, plus roots
//! left without a marker by an interrupted build.
//!
//! Only directories that carry a checksum marker or gantry lock metadata are
//! cache roots. Anything else under the base is left alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::BuildCache;
use super::lock::{CacheLock, LockMode};
use crate::util::fs::{dir_size, is_hidden};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum PruneError {
  #[error("failed to read cache base directory {path}: {source}")]
  ReadBase {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, Serialize)]
pub struct PruneStats {
  pub scanned: usize,
  pub removed: usize,
  pub skipped_locked: usize,
  /// Directories under the base that are not cache roots.
  pub skipped_foreign: usize,
  pub bytes_freed: u64,
}

#[derive(Debug, Serialize)]
pub struct PruneResult {
  pub stats: PruneStats,
  pub removed_paths: Vec<PathBuf>,
  pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
  Foreign,
  Keep,
  Stale,
  Incomplete,
}

/// Judged without creating or locking anything in the directory.
fn judge(cache: &BuildCache, max_age: Duration, now: SystemTime) -> Verdict {
  if matches!(cache.read_marker(), Ok(Some(_))) {
    return match cache.marker_modified().map(|built| now.duration_since(built)) {
      Some(Ok(age)) if age > max_age => Verdict::Stale,
      _ => Verdict::Keep,
    };
  }
  if CacheLock::last_holder(cache.root()).is_some() {
    Verdict::Incomplete
  } else {
    Verdict::Foreign
  }
}

/// Delete a locked root. On unix the lock is held until the tree is gone;
/// windows cannot delete a file that is still open.
fn remove_root(path: &Path, lock: CacheLock) -> io::Result<()> {
  #[cfg(windows)]
  drop(lock);
  let result = fs::remove_dir_all(path);
  #[cfg(not(windows))]
  drop(lock);
  result
}

/// Remove cache roots under `base` older than `max_age`.
///
/// A missing base directory yields an empty result. Roots locked by another
/// process are skipped; failures to delete a single root are logged and the
/// sweep continues.
pub fn prune(base: &Path, max_age: Duration, dry_run: bool) -> Result<PruneResult, PruneError> {
  let mut stats = PruneStats::default();
  let mut removed_paths = Vec::new();

  let entries = match fs::read_dir(base) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      debug!(base = %base.display(), "no cache base directory");
      return Ok(PruneResult {
        stats,
        removed_paths,
        dry_run,
      });
    }
    Err(source) => {
      return Err(PruneError::ReadBase {
        path: base.to_path_buf(),
        source,
      });
    }
  };

  let now = SystemTime::now();

  for entry in entries.flatten() {
    let path = entry.path();
    if !path.is_dir() || is_hidden(&entry.file_name()) {
      continue;
    }
    stats.scanned += 1;

    let cache = BuildCache::new(&path);
    match judge(&cache, max_age, now) {
      Verdict::Foreign => {
        debug!(path = %path.display(), "not a cache root, leaving it alone");
        stats.skipped_foreign += 1;
        continue;
      }
      Verdict::Keep => continue,
      Verdict::Stale | Verdict::Incomplete => {}
    }

    let size = dir_size(&path);

    // Take the lock to make sure no build is using this root right now.
    let lock = match CacheLock::acquire(&path, LockMode::Exclusive, "prune") {
      Ok(lock) => lock,
      Err(e) if e.is_contention() => {
        info!(path = %path.display(), "cache root in use, skipping");
        stats.skipped_locked += 1;
        continue;
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to lock cache root, skipping");
        continue;
      }
    };

    // A build may have finished between the check and the lock. The lock
    // file now holds our own metadata, so only the marker decides here.
    let verdict = judge(&cache, max_age, SystemTime::now());
    if verdict == Verdict::Keep {
      continue;
    }

    debug!(path = %path.display(), ?verdict, "removing cache root");

    if dry_run {
      stats.removed += 1;
      stats.bytes_freed += size;
      removed_paths.push(path);
      continue;
    }

    match remove_root(&path, lock) {
      Ok(()) => {
        stats.removed += 1;
        stats.bytes_freed += size;
        removed_paths.push(path);
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete cache root");
      }
    }
  }

  info!(
    scanned = stats.scanned,
    removed = stats.removed,
    bytes_freed = stats.bytes_freed,
    dry_run,
    "cache prune complete"
  );

  Ok(PruneResult {
    stats,
    removed_paths,
    dry_run,
  })
}
