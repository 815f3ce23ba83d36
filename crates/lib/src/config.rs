//! Project configuration.
//!
//! A project describes its function and dependency build in `gantry.yml`:
//!
//! ```yaml
//! function:
//!   name: billing
//!   runtime: python3.6
//!   path: src
//! dependencies:
//!   build: true
//!   install_dir: ./lib
//!   packages: [postgresql-devel]
//!   openssl: true
//!   timeout: 45m
//! ```
//!
//! Loading validates the file; [`ProjectConfig::to_request`] turns it into a
//! [`BuildRequest`] with absolute paths.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILENAME, DEFAULT_INSTALL_DIR, DEFAULT_MANIFEST};
use crate::platform::paths::service_cache_root;
use crate::request::{BuildRequest, CacheOverrides, NativeLib};
use crate::runtime::{Runtime, UnknownRuntime};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error(transparent)]
  UnknownRuntime(#[from] UnknownRuntime),

  #[error("missing required setting '{field}'")]
  Missing { field: &'static str },

  #[error("invalid value for '{field}': {value}")]
  InvalidValue { field: &'static str, value: String },

  #[error("{what} does not exist: {path}")]
  MissingPath { what: &'static str, path: PathBuf },

  #[error("invalid {what}: {path}")]
  InvalidPath { what: &'static str, path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
  pub function: FunctionConfig,
  #[serde(default)]
  pub dependencies: Option<DependencyConfig>,
  /// Docker-compatible CLI used to run containers.
  #[serde(default = "default_engine")]
  pub engine: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
  pub name: String,
  #[serde(default = "default_runtime")]
  pub runtime: String,
  /// Function source directory, relative to the project root.
  #[serde(default = "default_function_path")]
  pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyConfig {
  #[serde(default)]
  pub build: bool,
  /// Manifest file, relative to the function source directory.
  #[serde(default)]
  pub manifest: Option<PathBuf>,
  #[serde(default)]
  pub cache_dir: Option<PathBuf>,
  #[serde(default)]
  pub install_dir: Option<PathBuf>,
  #[serde(default)]
  pub packages: Vec<String>,
  #[serde(default)]
  pub openssl: bool,
  #[serde(default)]
  pub libffi: bool,
  #[serde(default)]
  pub libxml: bool,
  #[serde(default)]
  pub image: Option<String>,
  /// Maximum build wait, humantime syntax ("45m", "2h").
  #[serde(default)]
  pub timeout: Option<String>,
}

fn default_engine() -> String {
  "docker".to_string()
}

fn default_runtime() -> String {
  Runtime::Python27.as_str().to_string()
}

fn default_function_path() -> PathBuf {
  PathBuf::from(".")
}

impl ProjectConfig {
  /// Load `gantry.yml` from a project directory.
  pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
    let path = project_dir.join(CONFIG_FILENAME);
    debug!(path = %path.display(), "loading project config");

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
      path: path.clone(),
      source,
    })?;
    Self::parse(&content, &path)
  }

  pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let config: ProjectConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if config.function.name.trim().is_empty() {
      return Err(ConfigError::Missing { field: "function.name" });
    }
    config.runtime()?;
    config.timeout()?;

    Ok(config)
  }

  pub fn runtime(&self) -> Result<Runtime, ConfigError> {
    Ok(self.function.runtime.parse::<Runtime>()?)
  }

  /// The dependency section, when builds are enabled.
  pub fn enabled_dependencies(&self) -> Option<&DependencyConfig> {
    self.dependencies.as_ref().filter(|d| d.build)
  }

  pub fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = self.dependencies.as_ref().and_then(|d| d.timeout.as_deref()) else {
      return Ok(None);
    };
    humantime::parse_duration(raw)
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue {
        field: "dependencies.timeout",
        value: raw.to_string(),
      })
  }

  /// Build the request for this project.
  ///
  /// Relative paths are resolved against `project_dir`; the cache root
  /// defaults to the per-service wheelhouse in the user cache directory.
  pub fn to_request(&self, project_dir: &Path, overrides: CacheOverrides) -> Result<BuildRequest, ConfigError> {
    let project_root = dunce::canonicalize(project_dir).map_err(|_| ConfigError::MissingPath {
      what: "project root",
      path: project_dir.to_path_buf(),
    })?;

    let deps = self.dependencies.clone().unwrap_or_default();

    let function_dir = project_root.join(&self.function.path);
    let manifest = function_dir.join(deps.manifest.as_deref().unwrap_or(Path::new(DEFAULT_MANIFEST)));
    let manifest = dunce::canonicalize(&manifest).map_err(|_| ConfigError::MissingPath {
      what: "dependency manifest",
      path: manifest,
    })?;

    let cache_root = match &deps.cache_dir {
      Some(dir) if dir.is_absolute() => dir.clone(),
      Some(dir) => project_root.join(dir),
      None => service_cache_root(&self.function.name),
    };

    let install_dir = deps.install_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR));

    let mut builder = BuildRequest::builder(self.runtime()?, &self.function.name, project_root, manifest, cache_root)
      .install_dir(install_dir)
      .extra_system_packages(deps.packages)
      .build_flag(NativeLib::Openssl, deps.openssl)
      .build_flag(NativeLib::Libffi, deps.libffi)
      .build_flag(NativeLib::Libxml, deps.libxml)
      .overrides(overrides);

    if let Some(image) = deps.image {
      builder = builder.image(image);
    }

    builder.build()
  }
}
