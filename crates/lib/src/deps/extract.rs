//! Copying a directory tree out of a container.
//!
//! Extraction stages into a hidden sibling of the destination first, so a
//! failed copy leaves the destination exactly as it was. The staged tree is
//! then committed with renames:
//!
//! - [`ExtractMode::Merge`]: staged entries replace same-named entries; others
//!   stay. Hidden staged entries are dropped so bookkeeping such as the lock
//!   file is never overwritten.
//! - [`ExtractMode::Replace`]: everything previously in the destination is
//!   removed first.
//!
//! A killed run leaves its staging directory behind; the next extraction
//! into the same parent sweeps staging directories older than
//! [`STALE_STAGING_AGE`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::STAGING_PREFIX;
use crate::engine::{ContainerEngine, ContainerId, EngineError};
use crate::util::fs::{is_hidden, move_entries, remove_entry};

/// Staging directories older than this are left over from runs that died.
/// Must exceed the longest build timeout in use.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
  Merge,
  Replace,
}

#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("failed to prepare staging directory next to {dest}: {source}")]
  Stage {
    dest: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {container_path} out of container {container}: {source}")]
  Copy {
    container: String,
    container_path: String,
    #[source]
    source: EngineError,
  },

  #[error("failed to move extracted files into {dest}: {source}")]
  Commit {
    dest: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Copy the contents of `container_path` into `dest`, creating it if needed.
///
/// Returns the number of top-level entries committed.
pub fn extract<E>(
  engine: &E,
  id: &ContainerId,
  container_path: &str,
  dest: &Path,
  mode: ExtractMode,
) -> Result<usize, ExtractError>
where
  E: ContainerEngine + ?Sized,
{
  let stage_err = |source| ExtractError::Stage {
    dest: dest.to_path_buf(),
    source,
  };

  // Staging inside `dest` would be copied into itself when `dest` is mounted.
  fs::create_dir_all(dest).map_err(stage_err)?;
  let parent = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(dest);
  sweep_stale_staging(parent, STALE_STAGING_AGE);
  let staging = tempfile::Builder::new()
    .prefix(STAGING_PREFIX)
    .tempdir_in(parent)
    .map_err(stage_err)?;

  debug!(
    container = %id,
    from = container_path,
    staging = %staging.path().display(),
    "copying out of container"
  );
  engine
    .copy_out(id, container_path, staging.path())
    .map_err(|source| ExtractError::Copy {
      container: id.short().to_string(),
      container_path: container_path.to_string(),
      source,
    })?;

  let commit_err = |source| ExtractError::Commit {
    dest: dest.to_path_buf(),
    source,
  };

  match mode {
    ExtractMode::Merge => {
      for entry in fs::read_dir(staging.path()).map_err(commit_err)? {
        let entry = entry.map_err(commit_err)?;
        if is_hidden(&entry.file_name()) {
          remove_entry(&entry.path()).map_err(commit_err)?;
        }
      }
    }
    ExtractMode::Replace => {
      for entry in fs::read_dir(dest).map_err(commit_err)? {
        let entry = entry.map_err(commit_err)?;
        remove_entry(&entry.path()).map_err(commit_err)?;
      }
    }
  }

  let moved = move_entries(staging.path(), dest).map_err(commit_err)?;
  staging.close().map_err(commit_err)?;

  info!(dest = %dest.display(), entries = moved, ?mode, "extracted container output");
  Ok(moved)
}

/// Remove staging directories under `parent` last modified more than
/// `max_age` ago. Best effort; returns how many were removed.
pub fn sweep_stale_staging(parent: &Path, max_age: Duration) -> usize {
  let Ok(entries) = fs::read_dir(parent) else {
    return 0;
  };
  let now = SystemTime::now();
  let mut removed = 0;

  for entry in entries.flatten() {
    if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
      continue;
    }
    let is_stale = entry
      .metadata()
      .ok()
      .filter(|m| m.is_dir())
      .and_then(|m| m.modified().ok())
      .and_then(|modified| now.duration_since(modified).ok())
      .is_some_and(|age| age > max_age);
    if !is_stale {
      continue;
    }
    match fs::remove_dir_all(entry.path()) {
      Ok(()) => {
        debug!(path = %entry.path().display(), "removed stale staging directory");
        removed += 1;
      }
      Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove stale staging directory"),
    }
  }

  removed
}
