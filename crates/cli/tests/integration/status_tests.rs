use predicates::prelude::*;

use super::common::{BUILD_CONFIG, TestEnv, seed_cache_root};

#[test]
fn status_without_cache_needs_rebuild() {
  let env = TestEnv::project(BUILD_CONFIG);

  env
    .gantry_cmd()
    .arg("status")
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("cp36-cp36m"))
    .stdout(predicate::str::contains("Cached build: none"))
    .stdout(predicate::str::contains("Rebuild needed: yes"));

  // Looking must not create the cache root.
  assert!(!env.project_path().join(".wheelhouse").exists());
}

#[test]
fn status_with_stale_marker_warns() {
  let env = TestEnv::project(BUILD_CONFIG);
  seed_cache_root(&env.project_path().join(".wheelhouse"), true);

  env
    .gantry_cmd()
    .arg("status")
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Artifacts: 1"))
    .stdout(predicate::str::contains("Rebuild needed: yes"))
    .stderr(predicate::str::contains("manifest changed"));
}

#[test]
fn status_disabled_dependencies() {
  let env = TestEnv::project("function:\n  name: billing\n");

  env
    .gantry_cmd()
    .arg("status")
    .arg(env.project_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Dependencies: disabled"));
}

#[test]
fn status_json_output_is_valid() {
  let env = TestEnv::project(BUILD_CONFIG);

  let output = env
    .gantry_cmd()
    .arg("status")
    .arg(env.project_path())
    .args(["-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["service"], "billing");
  assert_eq!(json["runtime"], "python3.6");
  assert_eq!(json["dependencies_enabled"], true);
  assert_eq!(json["build"]["abi_tag"], "cp36-cp36m");
  assert_eq!(json["build"]["rebuild_needed"], true);
  assert!(json["build"]["cache"]["marker"].is_null());
  assert_eq!(json["build"]["fingerprint"].as_str().unwrap().len(), 40);
}
