//! Container engine capability.
//!
//! The builder never talks to a container runtime directly; it is handed a
//! [`ContainerEngine`]. Production code uses [`docker::DockerCli`], tests use
//! an in-memory fake.
//!
//! An isolated environment runs exactly one command: `create` it with its
//! mounts, `start` it detached, `inspect` until it has exited, read its
//! `logs` or `copy_out` what it produced, then `remove` it.

pub mod docker;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::SHORT_ID_LEN;

#[derive(Debug, Error)]
pub enum EngineError {
  /// The engine cannot be reached (binary missing, daemon down).
  #[error("container engine unavailable: {message}")]
  Unavailable { message: String },

  /// An engine command ran but failed.
  #[error("container engine command `{command}` failed (exit code {code:?}): {stderr}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to run container engine: {0}")]
  Io(#[from] std::io::Error),

  #[error("unexpected container engine output: {0}")]
  Parse(String),
}

/// Engine-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Abbreviated id, as shown by the engine's own listings.
  pub fn short(&self) -> &str {
    let len = self.0.len().min(SHORT_ID_LEN);
    &self.0[..len]
  }
}

impl std::fmt::Display for ContainerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.short())
  }
}

/// A host directory exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
  pub host: PathBuf,
  pub target: String,
  pub read_only: bool,
}

impl Mount {
  pub fn read_write(host: impl Into<PathBuf>, target: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      target: target.into(),
      read_only: false,
    }
  }

  pub fn read_only(host: impl Into<PathBuf>, target: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      target: target.into(),
      read_only: true,
    }
  }
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
  pub image: String,
  pub command: Vec<String>,
  pub mounts: Vec<Mount>,
  pub workdir: Option<String>,
  pub labels: Vec<(String, String)>,
}

impl ContainerSpec {
  pub fn new(image: impl Into<String>, command: Vec<String>) -> Self {
    Self {
      image: image.into(),
      command,
      mounts: Vec::new(),
      workdir: None,
      labels: Vec::new(),
    }
  }

  pub fn mount(mut self, mount: Mount) -> Self {
    self.mounts.push(mount);
    self
  }

  pub fn workdir(mut self, dir: impl Into<String>) -> Self {
    self.workdir = Some(dir.into());
    self
  }

  pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.labels.push((key.into(), value.into()));
    self
  }

  /// The host path backing a container path, when it falls under a mount.
  pub fn host_path_for(&self, container_path: &str) -> Option<PathBuf> {
    self.mounts.iter().find_map(|m| {
      let rest = Path::new(container_path).strip_prefix(&m.target).ok()?;
      Some(m.host.join(rest))
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
  Created,
  Running,
  Exited,
  Other(String),
}

impl ContainerStatus {
  pub fn parse(raw: &str) -> Self {
    match raw {
      "created" => ContainerStatus::Created,
      "running" => ContainerStatus::Running,
      "exited" => ContainerStatus::Exited,
      other => ContainerStatus::Other(other.to_string()),
    }
  }

  pub fn is_exited(&self) -> bool {
    matches!(self, ContainerStatus::Exited)
  }
}

/// Result of polling a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
  pub status: ContainerStatus,
  /// Only meaningful once exited.
  pub exit_code: i64,
}

/// Operations the builder needs from a container runtime.
///
/// All calls block until the engine answers. Implementations must not
/// require interactive input.
pub trait ContainerEngine {
  /// Check that the engine is reachable.
  fn ping(&self) -> Result<(), EngineError>;

  fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError>;

  /// Start a created container detached.
  fn start(&self, id: &ContainerId) -> Result<(), EngineError>;

  fn inspect(&self, id: &ContainerId) -> Result<ContainerState, EngineError>;

  /// Combined stdout and stderr of the container.
  fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, EngineError>;

  /// Copy the contents of `container_path` into the local directory `dest`,
  /// which must exist.
  fn copy_out(&self, id: &ContainerId, container_path: &str, dest: &Path) -> Result<(), EngineError>;

  /// Remove the container, stopping it first if needed.
  fn remove(&self, id: &ContainerId) -> Result<(), EngineError>;
}
