//! [`ContainerEngine`] backed by a docker-compatible command line.
//!
//! Every operation is one invocation of the engine binary. Anything that
//! speaks the docker CLI (docker, podman) works.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::{debug, trace};

use super::{ContainerEngine, ContainerId, ContainerSpec, ContainerState, ContainerStatus, EngineError};

/// Fragments of daemon error output meaning the engine itself is down.
const UNAVAILABLE_HINTS: &[&str] = &[
  "Cannot connect to the Docker daemon",
  "Is the docker daemon running",
  "error during connect",
  "connection refused",
];

#[derive(Debug, Clone)]
pub struct DockerCli {
  binary: PathBuf,
}

impl Default for DockerCli {
  fn default() -> Self {
    Self::new("docker")
  }
}

impl DockerCli {
  pub fn new(binary: impl Into<PathBuf>) -> Self {
    Self { binary: binary.into() }
  }

  pub fn binary(&self) -> &Path {
    &self.binary
  }

  fn run<I, S>(&self, args: I) -> Result<Output, EngineError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
  {
    let mut command = Command::new(&self.binary);
    command.args(args);
    trace!(command = ?command, "invoking container engine");

    command.output().map_err(|e| match e.kind() {
      io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => EngineError::Unavailable {
        message: format!("cannot run {}: {}", self.binary.display(), e),
      },
      _ => EngineError::Io(e),
    })
  }

  /// Run and require success, returning stdout.
  fn run_checked(&self, args: &[String]) -> Result<Vec<u8>, EngineError> {
    let output = self.run(args)?;
    if output.status.success() {
      return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if is_unavailable(&stderr) {
      return Err(EngineError::Unavailable { message: stderr });
    }
    Err(EngineError::CommandFailed {
      command: format!("{} {}", self.binary.display(), args.first().map(String::as_str).unwrap_or("")),
      code: output.status.code(),
      stderr,
    })
  }
}

fn is_unavailable(stderr: &str) -> bool {
  UNAVAILABLE_HINTS.iter().any(|hint| stderr.contains(hint))
}

/// Arguments for `create`.
pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
  let mut args = vec!["create".to_string()];

  for mount in &spec.mounts {
    let mut volume = format!("{}:{}", mount.host.display(), mount.target);
    if mount.read_only {
      volume.push_str(":ro");
    }
    args.push("--volume".to_string());
    args.push(volume);
  }

  if let Some(dir) = &spec.workdir {
    args.push("--workdir".to_string());
    args.push(dir.clone());
  }

  for (key, value) in &spec.labels {
    args.push("--label".to_string());
    args.push(format!("{}={}", key, value));
  }

  args.push(spec.image.clone());
  args.extend(spec.command.iter().cloned());
  args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
  status: String,
  #[serde(default)]
  exit_code: i64,
}

pub(crate) fn parse_state(raw: &[u8]) -> Result<ContainerState, EngineError> {
  let state: RawState = serde_json::from_slice(raw).map_err(|e| EngineError::Parse(format!("container state: {}", e)))?;
  Ok(ContainerState {
    status: ContainerStatus::parse(&state.status),
    exit_code: state.exit_code,
  })
}

impl ContainerEngine for DockerCli {
  fn ping(&self) -> Result<(), EngineError> {
    let output = self.run(["version", "--format", "{{.Server.Version}}"])?;
    if output.status.success() {
      debug!(
        engine = %self.binary.display(),
        version = %String::from_utf8_lossy(&output.stdout).trim(),
        "container engine reachable"
      );
      return Ok(());
    }
    Err(EngineError::Unavailable {
      message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
  }

  fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError> {
    let stdout = self.run_checked(&create_args(spec))?;
    let id = String::from_utf8_lossy(&stdout).trim().to_string();
    if id.is_empty() {
      return Err(EngineError::Parse("create returned no container id".to_string()));
    }
    Ok(ContainerId::new(id))
  }

  fn start(&self, id: &ContainerId) -> Result<(), EngineError> {
    self.run_checked(&["start".to_string(), id.as_str().to_string()])?;
    Ok(())
  }

  fn inspect(&self, id: &ContainerId) -> Result<ContainerState, EngineError> {
    let stdout = self.run_checked(&[
      "inspect".to_string(),
      "--format".to_string(),
      "{{json .State}}".to_string(),
      id.as_str().to_string(),
    ])?;
    parse_state(&stdout)
  }

  fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, EngineError> {
    let output = self.run(["logs", id.as_str()])?;
    if !output.status.success() {
      return Err(EngineError::CommandFailed {
        command: format!("{} logs", self.binary.display()),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    // The engine replays the container's stderr on its own stderr.
    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(combined)
  }

  fn copy_out(&self, id: &ContainerId, container_path: &str, dest: &Path) -> Result<(), EngineError> {
    // A trailing `/.` copies the directory's contents rather than the directory.
    let source = format!("{}:{}/.", id.as_str(), container_path.trim_end_matches('/'));
    self.run_checked(&["cp".to_string(), source, dest.display().to_string()])?;
    Ok(())
  }

  fn remove(&self, id: &ContainerId) -> Result<(), EngineError> {
    self.run_checked(&["rm".to_string(), "--force".to_string(), id.as_str().to_string()])?;
    Ok(())
  }
}
