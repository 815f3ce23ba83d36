use predicates::prelude::*;

use super::common::{BUILD_CONFIG, TestEnv};

#[test]
fn disabled_dependencies_is_a_no_op() {
  let env = TestEnv::project("function:\n  name: billing\n  path: src\n");

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("not enabled"));

  assert!(!env.project_path().join("lib").exists());
}

#[test]
fn disabled_dependencies_json_reports_skip() {
  let env = TestEnv::project("function:\n  name: billing\ndependencies:\n  build: false\n");

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .args(["-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"skipped\": true"));
}

#[test]
fn missing_config_fails() {
  let env = TestEnv::empty();

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load project config"));
}

#[test]
fn unknown_runtime_fails() {
  let env = TestEnv::project("function:\n  name: billing\n  runtime: nodejs6.10\n");

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported runtime"));
}

#[test]
fn missing_manifest_fails_before_any_container() {
  let env = TestEnv::project("function:\n  name: billing\n  path: lambda\ndependencies:\n  build: true\n");

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency manifest does not exist"));
}

#[test]
fn unavailable_engine_fails_without_touching_the_cache() {
  let config = format!("{}engine: /nonexistent/docker\n", BUILD_CONFIG);
  let env = TestEnv::project(&config);

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("container engine is not available"));

  assert!(!env.project_path().join(".wheelhouse").exists());
  assert!(!env.project_path().join("lib").exists());
}

#[test]
fn bad_configured_timeout_fails() {
  let config = format!("{}  timeout: soon\n", BUILD_CONFIG);
  let env = TestEnv::project(&config);

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependencies.timeout"));
}

#[test]
fn install_dir_at_project_root_is_refused() {
  let config = format!("{}  install_dir: .\nengine: /nonexistent/docker\n", BUILD_CONFIG);
  let env = TestEnv::project(&config);
  env.write_file("project/handler.py", "def handle(event, ctx):\n    pass\n");

  env
    .gantry_cmd()
    .arg("build-deps")
    .arg(env.project_path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("install directory"));

  assert!(env.project_path().join("handler.py").exists());
  assert!(env.project_path().join("gantry.yml").exists());
  assert!(env.project_path().join("src/requirements.txt").exists());
}
