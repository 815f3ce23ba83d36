//! Fingerprint-keyed dependency cache.
//!
//! A cache root holds the artifacts of the most recent successful build for
//! one service, plus a checksum marker naming the manifest fingerprint that
//! produced them.
//!
//! # Layout
//!
//! ```text
//! <cache_root>/
//! ├── sha1sum          # single-line fingerprint of the manifest
//! ├── *.whl            # built artifacts
//! └── .lock            # advisory lock (bookkeeping, never cleaned)
//! ```
//!
//! # Submodules
//!
//! - [`lock`] - Advisory lock guarding a cache root
//! - [`prune`] - Explicit eviction of stale cache roots

pub mod lock;
pub mod prune;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::MARKER_FILENAME;
use crate::request::BuildRequest;
use crate::util::fs::{dir_size, is_hidden, remove_entry, remove_if_exists};
use crate::util::hash::Fingerprint;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to fingerprint manifest {path}: {source}")]
  Fingerprint {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read checksum marker {path}: {source}")]
  ReadMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write checksum marker {path}: {source}")]
  WriteMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to clean cache {path}: {source}")]
  Cleanup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read cache directory {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Snapshot of a cache root, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
  pub root: PathBuf,
  pub marker: Option<Fingerprint>,
  pub artifacts: usize,
  pub bytes: u64,
  /// Unix seconds of the marker's last write.
  pub built_at: Option<u64>,
}

/// A service's cache root.
#[derive(Debug, Clone)]
pub struct BuildCache {
  root: PathBuf,
}

impl BuildCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn for_request(request: &BuildRequest) -> Self {
    Self::new(request.cache_root())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn marker_path(&self) -> PathBuf {
    self.root.join(MARKER_FILENAME)
  }

  /// Decide whether the request's dependencies must be rebuilt.
  ///
  /// In priority order:
  /// 1. `force_rebuild` answers true.
  /// 2. `force_cleanup` empties the cache, then the checks continue.
  /// 3. No marker answers true.
  /// 4. Otherwise rebuild iff the marker differs from the manifest's current fingerprint.
  pub fn should_rebuild(&self, request: &BuildRequest) -> Result<bool, CacheError> {
    let overrides = request.overrides();

    if overrides.force_rebuild {
      warn!(service = %request.service_name(), "force rebuild requested, rebuilding dependencies");
      return Ok(true);
    }

    if overrides.force_cleanup {
      warn!(cache = %self.root.display(), "force cleanup requested, cleaning up dependency cache");
      let removed = self.cleanup()?;
      debug!(removed, "cache entries removed");
    }

    let Some(stored) = self.read_marker()? else {
      info!(cache = %self.root.display(), "no checksum marker, rebuilding dependencies");
      return Ok(true);
    };

    let current = Fingerprint::of_file(request.manifest_path()).map_err(|source| CacheError::Fingerprint {
      path: request.manifest_path().to_path_buf(),
      source,
    })?;

    if stored == current {
      info!(fingerprint = %current.short(), "dependency manifest unchanged, skipping build");
      Ok(false)
    } else {
      info!(
        stored = %stored.short(),
        current = %current.short(),
        "dependency manifest changed, rebuilding dependencies"
      );
      Ok(true)
    }
  }

  /// Read the stored fingerprint.
  ///
  /// A missing, empty or unparseable marker reads as `None`, which forces a
  /// rebuild.
  pub fn read_marker(&self) -> Result<Option<Fingerprint>, CacheError> {
    let path = self.marker_path();
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(CacheError::ReadMarker { path, source }),
    };

    match content.lines().next().unwrap_or("").parse::<Fingerprint>() {
      Ok(fp) => Ok(Some(fp)),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring malformed checksum marker");
        Ok(None)
      }
    }
  }

  /// Write the marker atomically (temp file, then rename).
  pub fn write_marker(&self, fingerprint: &Fingerprint) -> Result<(), CacheError> {
    let path = self.marker_path();
    let wrap = |source| CacheError::WriteMarker {
      path: path.clone(),
      source,
    };

    fs::create_dir_all(&self.root).map_err(wrap)?;
    let mut temp = tempfile::Builder::new()
      .prefix(".sha1sum-")
      .tempfile_in(&self.root)
      .map_err(wrap)?;
    writeln!(temp, "{}", fingerprint).map_err(wrap)?;
    temp.persist(&path).map_err(|e| wrap(e.error))?;

    debug!(path = %path.display(), fingerprint = %fingerprint.short(), "checksum marker written");
    Ok(())
  }

  /// Delete the marker so an interrupted rebuild is never mistaken for a
  /// complete one. Artifacts stay.
  pub fn invalidate(&self) -> Result<bool, CacheError> {
    let path = self.marker_path();
    remove_if_exists(&path).map_err(|source| CacheError::Cleanup { path, source })
  }

  /// Remove every artifact and the marker. Hidden bookkeeping entries stay.
  ///
  /// A missing cache root is not an error. Returns the number of entries removed.
  pub fn cleanup(&self) -> Result<usize, CacheError> {
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
      Err(source) => {
        return Err(CacheError::ReadDir {
          path: self.root.clone(),
          source,
        });
      }
    };

    let mut removed = 0;
    for entry in entries {
      let entry = entry.map_err(|source| CacheError::ReadDir {
        path: self.root.clone(),
        source,
      })?;
      if is_hidden(&entry.file_name()) {
        continue;
      }
      let path = entry.path();
      match remove_entry(&path) {
        Ok(()) => removed += 1,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(CacheError::Cleanup { path, source }),
      }
    }

    Ok(removed)
  }

  /// Artifact entries currently in the cache (marker and hidden entries excluded).
  pub fn artifacts(&self) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(CacheError::ReadDir {
          path: self.root.clone(),
          source,
        });
      }
    };

    let mut artifacts: Vec<PathBuf> = entries
      .filter_map(|e| e.ok())
      .filter(|e| !is_hidden(&e.file_name()) && e.file_name() != MARKER_FILENAME)
      .map(|e| e.path())
      .collect();
    artifacts.sort();
    Ok(artifacts)
  }

  pub fn summary(&self) -> Result<CacheSummary, CacheError> {
    let artifacts = self.artifacts()?;
    let bytes: u64 = artifacts
      .iter()
      .map(|p| if p.is_dir() { dir_size(p) } else { fs::metadata(p).map(|m| m.len()).unwrap_or(0) })
      .sum();

    Ok(CacheSummary {
      root: self.root.clone(),
      marker: self.read_marker()?,
      artifacts: artifacts.len(),
      bytes,
      built_at: self.marker_modified().and_then(unix_secs),
    })
  }

  /// Last write time of the marker, if present.
  pub fn marker_modified(&self) -> Option<SystemTime> {
    fs::metadata(self.marker_path()).and_then(|m| m.modified()).ok()
  }
}

fn unix_secs(time: SystemTime) -> Option<u64> {
  time.duration_since(SystemTime::UNIX_EPOCH).ok().map(|d| d.as_secs())
}
