//! Test doubles for gantry-lib.
//!
//! [`FakeEngine`] implements [`ContainerEngine`] in memory. Bind mounts are
//! honoured: a container path under a mount resolves to the host directory,
//! anything else lands in a private per-container root filesystem. What a
//! container "does" when started is decided by a behaviour closure; the
//! default, [`pip_behavior`], imitates the build and install scripts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::consts::{ARTIFACT_MOUNT, DEFAULT_MANIFEST, INSTALL_TARGET, MARKER_FILENAME, SOURCE_MOUNT};
use crate::engine::{ContainerEngine, ContainerId, ContainerSpec, ContainerState, ContainerStatus, EngineError};
use crate::util::fs::remove_if_exists;
use crate::util::hash::Fingerprint;

/// What a started container ends up doing.
#[derive(Debug, Clone)]
pub struct FakeOutcome {
  pub exit_code: i64,
  pub logs: String,
  /// Polls answered with `running` before `exited`; `None` never exits.
  pub polls_until_exit: Option<usize>,
}

impl FakeOutcome {
  pub fn success() -> Self {
    Self {
      exit_code: 0,
      logs: String::new(),
      polls_until_exit: Some(0),
    }
  }

  pub fn failure(exit_code: i64, logs: &str) -> Self {
    Self {
      exit_code,
      logs: logs.to_string(),
      polls_until_exit: Some(0),
    }
  }

  pub fn hang(logs: &str) -> Self {
    Self {
      exit_code: 0,
      logs: logs.to_string(),
      polls_until_exit: None,
    }
  }

  pub fn after_polls(mut self, polls: usize) -> Self {
    self.polls_until_exit = Some(polls);
    self
  }
}

/// View of a container handed to a behaviour when it starts.
pub struct FakeRun<'a> {
  pub spec: &'a ContainerSpec,
  rootfs: &'a Path,
}

impl FakeRun<'_> {
  /// Host path backing a container path.
  pub fn resolve(&self, container_path: &str) -> PathBuf {
    resolve(self.spec, self.rootfs, container_path)
  }

  /// File name of the script the container runs.
  pub fn script_name(&self) -> Option<&str> {
    self.spec.command.last().and_then(|c| c.rsplit('/').next())
  }
}

fn resolve(spec: &ContainerSpec, rootfs: &Path, container_path: &str) -> PathBuf {
  spec
    .host_path_for(container_path)
    .unwrap_or_else(|| rootfs.join(container_path.trim_start_matches('/')))
}

type Behavior = Box<dyn Fn(&FakeRun<'_>) -> FakeOutcome + Send + Sync>;

struct FakeContainer {
  spec: ContainerSpec,
  rootfs: TempDir,
  outcome: Option<FakeOutcome>,
  polls: usize,
  removed: bool,
}

#[derive(Default)]
struct FakeState {
  next_id: u64,
  containers: HashMap<String, FakeContainer>,
  calls: Vec<String>,
  scripts_seen: Vec<PathBuf>,
}

pub struct FakeEngine {
  available: bool,
  fail_create: bool,
  fail_remove: bool,
  fail_inspect_after: Option<usize>,
  behavior: Behavior,
  state: Mutex<FakeState>,
}

impl Default for FakeEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl FakeEngine {
  pub fn new() -> Self {
    Self {
      available: true,
      fail_create: false,
      fail_remove: false,
      fail_inspect_after: None,
      behavior: Box::new(pip_behavior),
      state: Mutex::new(FakeState::default()),
    }
  }

  pub fn with_behavior<F>(mut self, behavior: F) -> Self
  where
    F: Fn(&FakeRun<'_>) -> FakeOutcome + Send + Sync + 'static,
  {
    self.behavior = Box::new(behavior);
    self
  }

  pub fn unavailable(mut self) -> Self {
    self.available = false;
    self
  }

  pub fn failing_create(mut self) -> Self {
    self.fail_create = true;
    self
  }

  pub fn failing_remove(mut self) -> Self {
    self.fail_remove = true;
    self
  }

  /// `inspect` answers normally `polls` times, then errors.
  pub fn failing_inspect_after(mut self, polls: usize) -> Self {
    self.fail_inspect_after = Some(polls);
    self
  }

  /// Engine operations in call order, e.g. `"create build.sh"`, `"remove"`.
  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn created(&self) -> usize {
    self.state.lock().unwrap().containers.len()
  }

  /// Containers created and not removed.
  pub fn live_containers(&self) -> usize {
    self.state.lock().unwrap().containers.values().filter(|c| !c.removed).count()
  }

  /// Host paths of the scripts that existed when their container started.
  pub fn scripts_seen(&self) -> Vec<PathBuf> {
    self.state.lock().unwrap().scripts_seen.clone()
  }

  fn record(&self, call: String) {
    self.state.lock().unwrap().calls.push(call);
  }
}

/// Default behaviour: a stand-in for pip.
///
/// The build script turns each `name==version` manifest line into a pure
/// wheel in the wheelhouse and then writes the checksum marker. The install
/// script unpacks every wheel as a package directory under `/install`.
pub fn pip_behavior(run: &FakeRun<'_>) -> FakeOutcome {
  match run.script_name() {
    Some("build.sh") => {
      let manifest = run.resolve(&format!("{}/{}", SOURCE_MOUNT, DEFAULT_MANIFEST));
      let Ok(content) = fs::read_to_string(&manifest) else {
        return FakeOutcome::failure(1, "ERROR: Could not open requirements file\n");
      };
      let wheelhouse = run.resolve(ARTIFACT_MOUNT);
      fs::create_dir_all(&wheelhouse).unwrap();

      let mut logs = String::new();
      for line in content.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        let (name, version) = line.split_once("==").unwrap_or((line, "0"));
        let wheel = format!("{}-{}-py2.py3-none-any.whl", name, version);
        fs::write(wheelhouse.join(&wheel), line).unwrap();
        logs.push_str(&format!("Successfully built {}\n", wheel));
      }

      let fingerprint = Fingerprint::of_bytes(content.as_bytes());
      fs::write(wheelhouse.join(MARKER_FILENAME), format!("{}\n", fingerprint)).unwrap();

      FakeOutcome {
        logs,
        ..FakeOutcome::success()
      }
    }
    Some("install.sh") => {
      let wheelhouse = run.resolve(ARTIFACT_MOUNT);
      let target = run.resolve(INSTALL_TARGET);
      let _ = fs::remove_dir_all(&target);
      fs::create_dir_all(&target).unwrap();

      for entry in fs::read_dir(&wheelhouse).into_iter().flatten().flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix("-py2.py3-none-any.whl") {
          let package = stem.split('-').next().unwrap_or(stem);
          let dir = target.join(package);
          fs::create_dir_all(&dir).unwrap();
          fs::write(dir.join("__init__.py"), "").unwrap();
        }
      }
      FakeOutcome::success()
    }
    _ => FakeOutcome::success(),
  }
}

impl ContainerEngine for FakeEngine {
  fn ping(&self) -> Result<(), EngineError> {
    self.record("ping".to_string());
    if self.available {
      Ok(())
    } else {
      Err(EngineError::Unavailable {
        message: "Cannot connect to the Docker daemon".to_string(),
      })
    }
  }

  fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, EngineError> {
    let script = spec.command.last().cloned().unwrap_or_default();
    self.record(format!("create {}", script.rsplit('/').next().unwrap_or("")));
    if self.fail_create {
      return Err(EngineError::CommandFailed {
        command: "docker create".to_string(),
        code: Some(125),
        stderr: format!("Unable to find image '{}' locally", spec.image),
      });
    }

    let mut state = self.state.lock().unwrap();
    state.next_id += 1;
    let id = format!("{:012x}{:052x}", 0xfa4e_0000_0000u64 + state.next_id, state.next_id);
    state.containers.insert(
      id.clone(),
      FakeContainer {
        spec: spec.clone(),
        rootfs: TempDir::new()?,
        outcome: None,
        polls: 0,
        removed: false,
      },
    );
    Ok(ContainerId::new(id))
  }

  fn start(&self, id: &ContainerId) -> Result<(), EngineError> {
    self.record("start".to_string());
    let mut state = self.state.lock().unwrap();
    let FakeState {
      containers,
      scripts_seen,
      ..
    } = &mut *state;
    let container = containers.get_mut(id.as_str()).ok_or_else(|| no_such(id))?;

    if let Some(script) = container.spec.command.last() {
      let host = resolve(&container.spec, container.rootfs.path(), script);
      if host.is_file() {
        scripts_seen.push(host);
      }
    }

    let run = FakeRun {
      spec: &container.spec,
      rootfs: container.rootfs.path(),
    };
    container.outcome = Some((self.behavior)(&run));
    Ok(())
  }

  fn inspect(&self, id: &ContainerId) -> Result<ContainerState, EngineError> {
    let mut state = self.state.lock().unwrap();
    let container = state.containers.get_mut(id.as_str()).ok_or_else(|| no_such(id))?;

    let Some(outcome) = &container.outcome else {
      return Ok(ContainerState {
        status: ContainerStatus::Created,
        exit_code: 0,
      });
    };

    if self.fail_inspect_after.is_some_and(|n| container.polls >= n) {
      return Err(EngineError::CommandFailed {
        command: "docker inspect".to_string(),
        code: Some(1),
        stderr: "error during connect: connection reset by peer".to_string(),
      });
    }

    let exited = matches!(outcome.polls_until_exit, Some(n) if container.polls >= n);
    let exit_code = outcome.exit_code;
    container.polls += 1;

    Ok(if exited {
      ContainerState {
        status: ContainerStatus::Exited,
        exit_code,
      }
    } else {
      ContainerState {
        status: ContainerStatus::Running,
        exit_code: 0,
      }
    })
  }

  fn logs(&self, id: &ContainerId) -> Result<Vec<u8>, EngineError> {
    self.record("logs".to_string());
    let state = self.state.lock().unwrap();
    let container = state.containers.get(id.as_str()).ok_or_else(|| no_such(id))?;
    Ok(container.outcome.as_ref().map(|o| o.logs.clone().into_bytes()).unwrap_or_default())
  }

  fn copy_out(&self, id: &ContainerId, container_path: &str, dest: &Path) -> Result<(), EngineError> {
    self.record(format!("copy {}", container_path));
    let state = self.state.lock().unwrap();
    let container = state.containers.get(id.as_str()).ok_or_else(|| no_such(id))?;

    let source = resolve(&container.spec, container.rootfs.path(), container_path);
    if !source.is_dir() {
      return Err(EngineError::CommandFailed {
        command: "docker cp".to_string(),
        code: Some(1),
        stderr: format!("Could not find the file {} in container {}", container_path, id.short()),
      });
    }
    copy_tree(&source, dest)?;
    Ok(())
  }

  fn remove(&self, id: &ContainerId) -> Result<(), EngineError> {
    self.record("remove".to_string());
    if self.fail_remove {
      return Err(EngineError::CommandFailed {
        command: "docker rm".to_string(),
        code: Some(1),
        stderr: "removal of container is not permitted".to_string(),
      });
    }
    let mut state = self.state.lock().unwrap();
    let container = state.containers.get_mut(id.as_str()).ok_or_else(|| no_such(id))?;
    container.removed = true;
    Ok(())
  }
}

/// Recursively copy `src` into `dest`, creating `dest` and overwriting files,
/// the way `docker cp <id>:<path>/. <dest>` does.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
  fs::create_dir_all(dest)?;

  for entry in WalkDir::new(src).min_depth(1) {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      remove_if_exists(&target)?;
      symlink(&link, &target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &target)?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

fn no_such(id: &ContainerId) -> EngineError {
  EngineError::CommandFailed {
    command: "docker".to_string(),
    code: Some(1),
    stderr: format!("No such container: {}", id.as_str()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn copy_tree_preserves_structure_and_overwrites() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    let dest = temp.path().join("dest");
    fs::create_dir_all(src.join("pkg/sub")).unwrap();
    fs::write(src.join("pkg/__init__.py"), "new").unwrap();
    fs::write(src.join("pkg/sub/mod.py"), "mod").unwrap();

    fs::create_dir_all(dest.join("pkg")).unwrap();
    fs::write(dest.join("pkg/__init__.py"), "old").unwrap();
    fs::write(dest.join("keep.txt"), "keep").unwrap();

    copy_tree(&src, &dest).unwrap();

    assert_eq!(fs::read_to_string(dest.join("pkg/__init__.py")).unwrap(), "new");
    assert_eq!(fs::read_to_string(dest.join("pkg/sub/mod.py")).unwrap(), "mod");
    assert!(dest.join("keep.txt").exists());
  }
}
