//! The immutable input of one dependency build.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::runtime::Runtime;

/// Auxiliary native libraries that can be compiled from source before the
/// dependencies themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeLib {
  /// Crypto library (OpenSSL).
  Openssl,
  /// Foreign-function interface library (libffi).
  Libffi,
  /// XML libraries (libxml2 and libxslt).
  Libxml,
}

impl NativeLib {
  pub fn as_str(self) -> &'static str {
    match self {
      NativeLib::Openssl => "openssl",
      NativeLib::Libffi => "libffi",
      NativeLib::Libxml => "libxml",
    }
  }
}

/// Operator overrides for the rebuild decision.
///
/// Resolved once at the boundary (CLI flags or environment) and carried on
/// the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheOverrides {
  /// Rebuild even when the marker matches.
  pub force_rebuild: bool,
  /// Delete cached artifacts and the marker before deciding.
  pub force_cleanup: bool,
}

impl CacheOverrides {
  /// Interpret override values the way the environment variables are read:
  /// only the literal `"true"` enables an override.
  pub fn from_values(force_rebuild: Option<&str>, force_cleanup: Option<&str>) -> Self {
    Self {
      force_rebuild: force_rebuild == Some("true"),
      force_cleanup: force_cleanup == Some("true"),
    }
  }
}

/// Everything the orchestrator needs for one build.
///
/// Construct with [`BuildRequest::builder`]; validation happens in
/// [`BuildRequestBuilder::build`], before any container is created.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  runtime: Runtime,
  service_name: String,
  project_root: PathBuf,
  manifest_path: PathBuf,
  cache_root: PathBuf,
  install_dir: PathBuf,
  extra_system_packages: Vec<String>,
  build_flags: BTreeSet<NativeLib>,
  overrides: CacheOverrides,
  image: String,
}

impl BuildRequest {
  pub fn builder(
    runtime: Runtime,
    service_name: impl Into<String>,
    project_root: impl Into<PathBuf>,
    manifest_path: impl Into<PathBuf>,
    cache_root: impl Into<PathBuf>,
  ) -> BuildRequestBuilder {
    BuildRequestBuilder {
      runtime,
      service_name: service_name.into(),
      project_root: project_root.into(),
      manifest_path: manifest_path.into(),
      cache_root: cache_root.into(),
      install_dir: PathBuf::from(crate::consts::DEFAULT_INSTALL_DIR),
      extra_system_packages: Vec::new(),
      build_flags: BTreeSet::new(),
      overrides: CacheOverrides::default(),
      image: None,
    }
  }

  pub fn runtime(&self) -> Runtime {
    self.runtime
  }

  pub fn service_name(&self) -> &str {
    &self.service_name
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn manifest_path(&self) -> &Path {
    &self.manifest_path
  }

  /// Directory holding the manifest; mounted as the source region.
  pub fn manifest_dir(&self) -> &Path {
    self.manifest_path.parent().unwrap_or(&self.project_root)
  }

  pub fn manifest_file_name(&self) -> String {
    self
      .manifest_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| crate::consts::DEFAULT_MANIFEST.to_string())
  }

  pub fn cache_root(&self) -> &Path {
    &self.cache_root
  }

  /// Install directory relative to the project root.
  pub fn install_dir(&self) -> &Path {
    &self.install_dir
  }

  /// Absolute install directory.
  pub fn install_path(&self) -> PathBuf {
    self.project_root.join(&self.install_dir)
  }

  pub fn extra_system_packages(&self) -> &[String] {
    &self.extra_system_packages
  }

  pub fn build_flags(&self) -> &BTreeSet<NativeLib> {
    &self.build_flags
  }

  pub fn builds(&self, lib: NativeLib) -> bool {
    self.build_flags.contains(&lib)
  }

  pub fn overrides(&self) -> CacheOverrides {
    self.overrides
  }

  pub fn image(&self) -> &str {
    &self.image
  }
}

#[derive(Debug, Clone)]
pub struct BuildRequestBuilder {
  runtime: Runtime,
  service_name: String,
  project_root: PathBuf,
  manifest_path: PathBuf,
  cache_root: PathBuf,
  install_dir: PathBuf,
  extra_system_packages: Vec<String>,
  build_flags: BTreeSet<NativeLib>,
  overrides: CacheOverrides,
  image: Option<String>,
}

impl BuildRequestBuilder {
  pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.install_dir = dir.into();
    self
  }

  pub fn extra_system_packages<I, S>(mut self, packages: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.extra_system_packages = packages.into_iter().map(Into::into).collect();
    self
  }

  pub fn build_flag(mut self, lib: NativeLib, enabled: bool) -> Self {
    if enabled {
      self.build_flags.insert(lib);
    } else {
      self.build_flags.remove(&lib);
    }
    self
  }

  pub fn overrides(mut self, overrides: CacheOverrides) -> Self {
    self.overrides = overrides;
    self
  }

  pub fn image(mut self, image: impl Into<String>) -> Self {
    self.image = Some(image.into());
    self
  }

  pub fn build(self) -> Result<BuildRequest, ConfigError> {
    if self.service_name.trim().is_empty() {
      return Err(ConfigError::Missing { field: "function.name" });
    }
    if !is_safe_token(&self.service_name) {
      return Err(ConfigError::InvalidValue {
        field: "function.name",
        value: self.service_name,
      });
    }

    require_absolute("project root", &self.project_root)?;
    require_absolute("manifest", &self.manifest_path)?;
    require_absolute("cache root", &self.cache_root)?;

    if !self.project_root.is_dir() {
      return Err(ConfigError::MissingPath {
        what: "project root",
        path: self.project_root,
      });
    }
    if !self.manifest_path.is_file() {
      return Err(ConfigError::MissingPath {
        what: "dependency manifest",
        path: self.manifest_path,
      });
    }
    if self.install_dir.is_absolute() || self.install_dir.as_os_str().is_empty() {
      return Err(ConfigError::InvalidPath {
        what: "install directory (must be relative to the project root)",
        path: self.install_dir,
      });
    }

    // The install phase empties this directory, so it must be a dedicated
    // subdirectory of the project.
    let Some(install_dir) = lexical_clean(&self.install_dir).filter(|d| d.components().next().is_some()) else {
      return Err(ConfigError::InvalidPath {
        what: "install directory (must be strictly inside the project root)",
        path: self.install_dir,
      });
    };
    let install_path = self.project_root.join(&install_dir);
    let manifest = lexical_clean(&self.manifest_path).unwrap_or_else(|| self.manifest_path.clone());
    if manifest.starts_with(&install_path) {
      return Err(ConfigError::InvalidPath {
        what: "install directory (must not contain the dependency manifest)",
        path: self.install_dir,
      });
    }
    let cache_root = lexical_clean(&self.cache_root).unwrap_or_else(|| self.cache_root.clone());
    if cache_root.starts_with(&install_path) || install_path.starts_with(&cache_root) {
      return Err(ConfigError::InvalidPath {
        what: "install directory (must not overlap the cache root)",
        path: self.install_dir,
      });
    }

    // Package names are interpolated into the build script.
    if let Some(bad) = self.extra_system_packages.iter().find(|p| !is_safe_token(p)) {
      return Err(ConfigError::InvalidValue {
        field: "dependencies.packages",
        value: bad.clone(),
      });
    }

    let image = self.image.unwrap_or_else(|| self.runtime.default_image().to_string());

    Ok(BuildRequest {
      runtime: self.runtime,
      service_name: self.service_name,
      project_root: self.project_root,
      manifest_path: self.manifest_path,
      cache_root: self.cache_root,
      install_dir,
      extra_system_packages: self.extra_system_packages,
      build_flags: self.build_flags,
      overrides: self.overrides,
      image,
    })
  }
}

fn require_absolute(what: &'static str, path: &Path) -> Result<(), ConfigError> {
  if path.is_absolute() {
    Ok(())
  } else {
    Err(ConfigError::InvalidPath {
      what,
      path: path.to_path_buf(),
    })
  }
}

/// Resolve `.` and `..` without touching the filesystem. `None` when a `..`
/// climbs above the start of a relative path or past the root.
fn lexical_clean(path: &Path) -> Option<PathBuf> {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !matches!(out.components().next_back(), Some(Component::Normal(_))) {
          return None;
        }
        out.pop();
      }
      other => out.push(other),
    }
  }
  Some(out)
}

fn is_safe_token(s: &str) -> bool {
  !s.is_empty()
    && s
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | ':' | '='))
}
