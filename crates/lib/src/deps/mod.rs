//! The dependency build pipeline.
//!
//! A build runs in two isolated phases against a [`ContainerEngine`]:
//!
//! 1. **Build** (only when the cache is stale): compile every manifest entry
//!    from source for the target ABI, repair platform wheels, write the
//!    checksum marker, and pull the wheels into the cache.
//! 2. **Install** (always): install from the cache only into a scratch
//!    directory inside the container and extract it over the project's
//!    install directory.
//!
//! # Submodules
//!
//! - [`script`] - Generated build and install scripts
//! - [`builder`] - Runs one container to completion
//! - [`extract`] - Staged extraction out of a container
//! - [`orchestrate`] - Sequences cache check, build and install
//!
//! [`ContainerEngine`]: crate::engine::ContainerEngine

pub mod builder;
pub mod extract;
pub mod orchestrate;
pub mod script;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::cache::lock::CacheLockError;
use crate::config::ConfigError;
use crate::engine::{ContainerId, EngineError};
use crate::util::hash::Fingerprint;

pub use builder::{IsolatedBuilder, WaitPolicy};
pub use extract::{ExtractError, ExtractMode};
pub use orchestrate::{DependencyBuilder, DepsReport, PhaseDisposal};

/// The two container runs of a dependency build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Build,
  Install,
}

impl Phase {
  pub fn as_str(self) -> &'static str {
    match self {
      Phase::Build => "build",
      Phase::Install => "install",
    }
  }

  /// File name of the phase's generated script.
  pub fn script_name(self) -> &'static str {
    match self {
      Phase::Build => "build.sh",
      Phase::Install => "install.sh",
    }
  }
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error)]
pub enum DepsError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("container engine is not available, is the daemon running? ({message})")]
  EngineUnavailable { message: String },

  #[error("{phase} container exited with non-zero code {exit_code}. Logs saved to {}", log_path.display())]
  BuildFailed {
    phase: Phase,
    exit_code: i64,
    log_path: PathBuf,
  },

  #[error(
    "{phase} container did not finish within {}. Logs saved to {}",
    humantime::format_duration(*waited),
    log_path.display()
  )]
  Timeout {
    phase: Phase,
    waited: Duration,
    log_path: PathBuf,
  },

  #[error("failed to save container logs to {path}: {source}")]
  FailureLog {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Extract(#[from] ExtractError),

  #[error("failed to write generated script: {0}")]
  Script(#[source] io::Error),

  #[error("failed to remove generated scripts in {path}: {source}")]
  ScriptCleanup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] CacheLockError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("container engine error: {0}")]
  Engine(#[source] EngineError),

  #[error("checksum marker after build is {found:?}, expected {expected}")]
  MarkerMismatch {
    expected: Fingerprint,
    found: Option<Fingerprint>,
  },
}

impl From<EngineError> for DepsError {
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::Unavailable { message } => DepsError::EngineUnavailable { message },
      other => DepsError::Engine(other),
    }
  }
}

/// Outcome of removing a finished container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Disposal {
  Removed,
  Failed {
    #[serde(serialize_with = "serialize_container")]
    container: ContainerId,
    message: String,
  },
}

impl Disposal {
  pub fn is_removed(&self) -> bool {
    matches!(self, Disposal::Removed)
  }
}

fn serialize_container<S: serde::Serializer>(id: &ContainerId, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(id.as_str())
}

/// A successful container run together with how its disposal went.
///
/// Disposal is best-effort: a failed removal never turns a successful run
/// into an error.
#[derive(Debug)]
pub struct Finished<T> {
  pub value: T,
  pub disposal: Disposal,
}
