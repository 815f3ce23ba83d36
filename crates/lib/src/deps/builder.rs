//! Running one isolated container to completion.
//!
//! [`IsolatedBuilder::run`] creates and starts a container, polls it until it
//! exits, and on success hands it to a caller-supplied step (usually an
//! extraction) before disposing of it. Failures persist the container output
//! to `container_<short-id>.log` in [`WaitPolicy::log_dir`].

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::script::GeneratedScript;
use super::{DepsError, Disposal, Finished, Phase};
use crate::consts::{
  APP_NAME, ARTIFACT_MOUNT, DEFAULT_BUILD_TIMEOUT, HEARTBEAT_INTERVAL, POLL_INTERVAL, SCRIPTS_MOUNT, SOURCE_MOUNT,
};
use crate::engine::{ContainerEngine, ContainerId, ContainerSpec, EngineError, Mount};
use crate::request::BuildRequest;

/// Why polling stopped short of a zero exit.
#[derive(Debug)]
enum Failure {
  NonZero(i64),
  TimedOut(Duration),
  /// The engine stopped answering for the container.
  Lost(EngineError),
}

/// How long and how often to wait for a container.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
  pub poll_interval: Duration,
  /// Interval between "still running" log lines.
  pub heartbeat_interval: Duration,
  /// Maximum wait before the container is abandoned.
  pub timeout: Duration,
  /// Where failure logs are written.
  pub log_dir: PathBuf,
}

impl Default for WaitPolicy {
  fn default() -> Self {
    Self {
      poll_interval: POLL_INTERVAL,
      heartbeat_interval: HEARTBEAT_INTERVAL,
      timeout: DEFAULT_BUILD_TIMEOUT,
      log_dir: PathBuf::from("."),
    }
  }
}

impl WaitPolicy {
  /// Failure log directory for the current execution context: the CI
  /// artifacts directory when running under CI and it is known, else the
  /// working directory.
  pub fn ci_log_dir(ci: bool, artifacts_dir: Option<PathBuf>) -> PathBuf {
    match (ci, artifacts_dir) {
      (true, Some(dir)) => dir,
      _ => PathBuf::from("."),
    }
  }

  pub fn log_path(&self, id: &ContainerId) -> PathBuf {
    self.log_dir.join(format!("container_{}.log", id.short()))
  }
}

/// The container layout for one phase of a request.
///
/// The cache root is the read/write artifact region, the manifest directory
/// is the read-only source region and the script directory is mounted
/// read-only.
pub fn environment_for(request: &BuildRequest, script: &GeneratedScript) -> ContainerSpec {
  ContainerSpec::new(
    request.image(),
    vec!["/bin/bash".to_string(), script.container_path()],
  )
  .mount(Mount::read_write(request.cache_root(), ARTIFACT_MOUNT))
  .mount(Mount::read_only(request.manifest_dir(), SOURCE_MOUNT))
  .mount(Mount::read_only(script.dir(), SCRIPTS_MOUNT))
  .workdir(SOURCE_MOUNT)
  .label(format!("{}.service", APP_NAME), request.service_name())
  .label(format!("{}.phase", APP_NAME), script.phase().as_str())
}

pub struct IsolatedBuilder<'a, E: ContainerEngine + ?Sized> {
  engine: &'a E,
  policy: &'a WaitPolicy,
}

impl<'a, E: ContainerEngine + ?Sized> IsolatedBuilder<'a, E> {
  pub fn new(engine: &'a E, policy: &'a WaitPolicy) -> Self {
    Self { engine, policy }
  }

  /// Run `spec` to a zero exit, then `on_success`, then dispose.
  ///
  /// A non-zero exit or timeout fails with the log path. A container that
  /// exited non-zero is kept for inspection; one that timed out or that the
  /// engine lost track of is removed.
  /// When `on_success` fails the container is still disposed of.
  pub fn run<T, F>(&self, spec: &ContainerSpec, phase: Phase, on_success: F) -> Result<Finished<T>, DepsError>
  where
    F: FnOnce(&ContainerId) -> Result<T, DepsError>,
  {
    let id = self.launch(spec, phase)?;
    self.wait(&id, phase)?;
    info!(container = %id, %phase, "container finished");

    let value = match on_success(&id) {
      Ok(value) => value,
      Err(e) => {
        self.dispose(&id);
        return Err(e);
      }
    };

    Ok(Finished {
      value,
      disposal: self.dispose(&id),
    })
  }

  /// Create and start a container detached.
  pub fn launch(&self, spec: &ContainerSpec, phase: Phase) -> Result<ContainerId, DepsError> {
    let id = self.engine.create(spec)?;
    debug!(container = %id, %phase, image = %spec.image, "container created");

    if let Err(e) = self.engine.start(&id) {
      self.dispose(&id);
      return Err(e.into());
    }

    info!(container = %id, %phase, "container started, waiting for completion");
    Ok(id)
  }

  /// Poll until the container exits with status zero.
  ///
  /// Every other outcome passes through [`Self::settle`], so no exit path
  /// leaves a container behind unless the keep policy says so.
  pub fn wait(&self, id: &ContainerId, phase: Phase) -> Result<(), DepsError> {
    self.poll(id).map_err(|failure| self.settle(id, phase, failure))
  }

  fn poll(&self, id: &ContainerId) -> Result<(), Failure> {
    let started = Instant::now();
    let mut last_heartbeat = started;

    loop {
      let state = self.engine.inspect(id).map_err(Failure::Lost)?;
      if state.status.is_exited() {
        return match state.exit_code {
          0 => Ok(()),
          code => Err(Failure::NonZero(code)),
        };
      }

      let waited = started.elapsed();
      if waited >= self.policy.timeout {
        return Err(Failure::TimedOut(waited));
      }

      thread::sleep(self.policy.poll_interval);

      if last_heartbeat.elapsed() >= self.policy.heartbeat_interval {
        warn!(
          container = %id,
          elapsed = %humantime::format_duration(Duration::from_secs(started.elapsed().as_secs())),
          "container still running, please be patient..."
        );
        last_heartbeat = Instant::now();
      }
    }
  }

  /// Capture logs, then apply the disposal policy: a container that exited
  /// non-zero is kept, anything else is removed.
  fn settle(&self, id: &ContainerId, phase: Phase, failure: Failure) -> DepsError {
    let saved = self.save_logs(id);

    match &failure {
      Failure::NonZero(code) => warn!(
        container = %id.as_str(),
        exit_code = code,
        "container kept for inspection, remove it manually when done"
      ),
      Failure::TimedOut(_) | Failure::Lost(_) => {
        self.dispose(id);
      }
    }

    match (failure, saved) {
      (Failure::Lost(e), saved) => {
        if let Err(log_err) = saved {
          warn!(container = %id, error = %log_err, "container logs not saved");
        }
        e.into()
      }
      (_, Err(log_err)) => log_err,
      (Failure::NonZero(exit_code), Ok(log_path)) => DepsError::BuildFailed {
        phase,
        exit_code,
        log_path,
      },
      (Failure::TimedOut(waited), Ok(log_path)) => DepsError::Timeout {
        phase,
        waited,
        log_path,
      },
    }
  }

  /// Remove the container, logging instead of failing.
  pub fn dispose(&self, id: &ContainerId) -> Disposal {
    match self.engine.remove(id) {
      Ok(()) => {
        debug!(container = %id, "container removed");
        Disposal::Removed
      }
      Err(e) => {
        error!(
          container = %id.as_str(),
          error = %e,
          "could not remove container, please remove it manually"
        );
        Disposal::Failed {
          container: id.clone(),
          message: e.to_string(),
        }
      }
    }
  }

  fn save_logs(&self, id: &ContainerId) -> Result<PathBuf, DepsError> {
    let path = self.policy.log_path(id);
    let logs = match self.engine.logs(id) {
      Ok(logs) => logs,
      Err(e) => {
        warn!(container = %id, error = %e, "failed to read container logs");
        format!("failed to read container logs: {}\n", e).into_bytes()
      }
    };
    write_log(&path, &logs)?;
    info!(path = %path.display(), "container logs saved");
    Ok(path)
  }
}

fn write_log(path: &Path, logs: &[u8]) -> Result<(), DepsError> {
  let wrap = |source| DepsError::FailureLog {
    path: path.to_path_buf(),
    source,
  };
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(wrap)?;
  }
  fs::write(path, logs).map_err(wrap)
}
