//! Sequencing a dependency build.
//!
//! ```text
//! START -> CHECK_CACHE -> (REBUILD -> EXTRACT_TO_CACHE)? -> INSTALL -> DONE
//! ```
//!
//! The engine is pinged and the cache root locked before anything else. The
//! install phase runs whether or not a rebuild happened, and never after a
//! failed rebuild. Each phase's generated script is removed before the phase
//! returns, whatever its outcome.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info};

use super::builder::{IsolatedBuilder, WaitPolicy, environment_for};
use super::extract::{ExtractMode, extract};
use super::script::{self, GeneratedScript};
use super::{DepsError, Disposal, Phase};
use crate::cache::lock::{CacheLock, LockMode};
use crate::cache::{BuildCache, CacheError};
use crate::consts::{ARTIFACT_MOUNT, INSTALL_TARGET};
use crate::engine::ContainerEngine;
use crate::request::BuildRequest;
use crate::util::hash::Fingerprint;

/// How a phase's container was disposed of.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseDisposal {
  pub phase: Phase,
  #[serde(flatten)]
  pub disposal: Disposal,
}

/// Result of a dependency build.
#[derive(Debug, Clone, Serialize)]
pub struct DepsReport {
  pub service: String,
  pub fingerprint: Fingerprint,
  /// Whether the build phase ran.
  pub rebuilt: bool,
  pub install_dir: PathBuf,
  /// Top-level entries placed in the install directory.
  pub installed: usize,
  pub cleanups: Vec<PhaseDisposal>,
}

impl DepsReport {
  /// Containers that could not be removed.
  pub fn leftover_containers(&self) -> impl Iterator<Item = &PhaseDisposal> {
    self.cleanups.iter().filter(|c| !c.disposal.is_removed())
  }
}

pub struct DependencyBuilder<'a, E: ContainerEngine + ?Sized> {
  engine: &'a E,
  policy: WaitPolicy,
  scripts_dir: Option<PathBuf>,
}

impl<'a, E: ContainerEngine + ?Sized> DependencyBuilder<'a, E> {
  pub fn new(engine: &'a E) -> Self {
    Self {
      engine,
      policy: WaitPolicy::default(),
      scripts_dir: None,
    }
  }

  pub fn wait_policy(mut self, policy: WaitPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Base directory for generated scripts (default: the system temp dir).
  pub fn scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.scripts_dir = Some(dir.into());
    self
  }

  /// Make the request's dependencies available in its install directory.
  pub fn run(&self, request: &BuildRequest) -> Result<DepsReport, DepsError> {
    info!(
      service = %request.service_name(),
      runtime = %request.runtime(),
      abi = %request.runtime().abi_tag(),
      "building dependencies"
    );

    self.engine.ping()?;

    let cache = BuildCache::for_request(request);
    let _lock = CacheLock::acquire(
      cache.root(),
      LockMode::Exclusive,
      &format!("build-deps {}", request.service_name()),
    )?;

    let fingerprint = Fingerprint::of_file(request.manifest_path()).map_err(|source| CacheError::Fingerprint {
      path: request.manifest_path().to_path_buf(),
      source,
    })?;

    let mut cleanups = Vec::new();

    let rebuilt = cache.should_rebuild(request)?;
    if rebuilt {
      let disposal = self.rebuild(request, &cache, &fingerprint)?;
      cleanups.push(PhaseDisposal {
        phase: Phase::Build,
        disposal,
      });
    }

    let (installed, disposal) = self.install(request)?;
    cleanups.push(PhaseDisposal {
      phase: Phase::Install,
      disposal,
    });

    info!(
      service = %request.service_name(),
      install_dir = %request.install_path().display(),
      rebuilt,
      "dependencies installed"
    );

    Ok(DepsReport {
      service: request.service_name().to_string(),
      fingerprint,
      rebuilt,
      install_dir: request.install_path(),
      installed,
      cleanups,
    })
  }

  fn rebuild(&self, request: &BuildRequest, cache: &BuildCache, fingerprint: &Fingerprint) -> Result<Disposal, DepsError> {
    cache.invalidate()?;
    info!(fingerprint = %fingerprint.short(), image = %request.image(), "compiling dependencies");

    let builder = IsolatedBuilder::new(self.engine, &self.policy);
    let finished = self.with_script(Phase::Build, &script::build_script(request, fingerprint), |script| {
      builder.run(&environment_for(request, script), Phase::Build, |id| {
        Ok(extract(self.engine, id, ARTIFACT_MOUNT, cache.root(), ExtractMode::Merge)?)
      })
    })?;

    let found = cache.read_marker()?;
    if found.as_ref() != Some(fingerprint) {
      return Err(DepsError::MarkerMismatch {
        expected: fingerprint.clone(),
        found,
      });
    }

    info!(artifacts = finished.value, "dependency build finished");
    Ok(finished.disposal)
  }

  fn install(&self, request: &BuildRequest) -> Result<(usize, Disposal), DepsError> {
    let install_path = request.install_path();
    info!(install_dir = %install_path.display(), "installing dependencies");

    let builder = IsolatedBuilder::new(self.engine, &self.policy);
    let finished = self.with_script(Phase::Install, &script::install_script(request), |script| {
      builder.run(&environment_for(request, script), Phase::Install, |id| {
        Ok(extract(self.engine, id, INSTALL_TARGET, &install_path, ExtractMode::Replace)?)
      })
    })?;

    Ok((finished.value, finished.disposal))
  }

  /// Write a phase script, run `f`, and remove the script on every path.
  ///
  /// A removal failure fails an otherwise successful phase; after a failed
  /// phase it is logged and the phase error is returned.
  fn with_script<T, F>(&self, phase: Phase, content: &str, f: F) -> Result<T, DepsError>
  where
    F: FnOnce(&GeneratedScript) -> Result<T, DepsError>,
  {
    let script = match &self.scripts_dir {
      Some(dir) => GeneratedScript::write_in(dir, phase, content),
      None => GeneratedScript::write(phase, content),
    }
    .map_err(DepsError::Script)?;

    let result = f(&script);
    let dir = script.dir().to_path_buf();

    match (result, script.close()) {
      (Ok(value), Ok(())) => Ok(value),
      (Ok(_), Err(source)) => Err(DepsError::ScriptCleanup { path: dir, source }),
      (Err(e), Ok(())) => Err(e),
      (Err(e), Err(close_err)) => {
        error!(path = %dir.display(), error = %close_err, "failed to remove generated script");
        Err(e)
      }
    }
  }
}
