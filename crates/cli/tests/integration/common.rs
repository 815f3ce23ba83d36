//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Config with dependency builds enabled and a cache root inside the project.
pub const BUILD_CONFIG: &str = r#"
function:
  name: billing
  runtime: python3.6
  path: src
dependencies:
  build: true
  cache_dir: .wheelhouse
  packages: [postgresql-devel]
  openssl: true
"#;

/// Isolated test environment.
///
/// Each test gets its own project directory and user cache directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// A project with `gantry.yml` and `src/requirements.txt`.
  pub fn project(config: &str) -> Self {
    let env = Self::empty();
    env.write_file("project/gantry.yml", config);
    env.write_file("project/src/requirements.txt", "psycopg2==2.7.3\nrequests==2.18.4\n");
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn project_path(&self) -> PathBuf {
    let p = self.temp.path().join("project");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// User cache directory (isolated per test).
  pub fn cache_path(&self) -> PathBuf {
    let p = self.temp.path().join("cache");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Per-service cache roots live here unless a project overrides it.
  pub fn wheelhouse_path(&self) -> PathBuf {
    self.cache_path().join("gantry").join("wheelhouse")
  }

  /// Get a pre-configured Command for the gantry binary.
  ///
  /// Points the user cache at the temp directory and clears the override
  /// and CI variables so the host environment cannot leak in.
  pub fn gantry_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("gantry");
    cmd.env("XDG_CACHE_HOME", self.cache_path());
    cmd.env("HOME", self.temp.path());
    cmd.env("LOCALAPPDATA", self.cache_path()); // For Windows
    cmd.env_remove("FORCE_DEPS_REBUILD");
    cmd.env_remove("FORCE_DEPS_CLEANUP");
    cmd.env_remove("CIRCLECI");
    cmd.env_remove("CIRCLE_ARTIFACTS");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

/// Create a cache root holding one artifact and the lock file a build leaves
/// behind. Without a marker it looks like an interrupted build.
pub fn seed_cache_root(root: &Path, with_marker: bool) {
  std::fs::create_dir_all(root).unwrap();
  std::fs::write(root.join("psycopg2-2.7.3-cp36-cp36m-manylinux1_x86_64.whl"), "wheel").unwrap();
  let metadata = serde_json::json!({
    "version": 1,
    "pid": 4242,
    "started_at_unix": 1_500_000_000u64,
    "command": "build-deps billing",
    "cache_root": root,
  });
  std::fs::write(root.join(".lock"), metadata.to_string()).unwrap();
  if with_marker {
    std::fs::write(root.join("sha1sum"), format!("{}\n", "a".repeat(40))).unwrap();
  }
}
