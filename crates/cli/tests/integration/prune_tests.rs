use predicates::prelude::*;

use super::common::{TestEnv, seed_cache_root};

#[test]
fn prune_with_no_caches_succeeds() {
  let env = TestEnv::empty();

  env
    .gantry_cmd()
    .arg("prune")
    .assert()
    .success()
    .stdout(predicate::str::contains("Prune complete"));
}

#[test]
fn prune_removes_incomplete_roots_and_keeps_fresh_ones() {
  let env = TestEnv::empty();
  let base = env.wheelhouse_path();
  seed_cache_root(&base.join("billing"), true);
  seed_cache_root(&base.join("reports"), false);

  env
    .gantry_cmd()
    .arg("prune")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed: 1"));

  assert!(base.join("billing").exists());
  assert!(!base.join("reports").exists());
}

#[test]
fn prune_dry_run_keeps_everything() {
  let env = TestEnv::empty();
  let base = env.temp.path().join("custom");
  seed_cache_root(&base.join("reports"), false);

  env
    .gantry_cmd()
    .arg("prune")
    .arg("--base")
    .arg(&base)
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains("Would remove: 1"));

  assert!(base.join("reports").exists());
}

#[test]
fn prune_json_output_is_valid() {
  let env = TestEnv::empty();

  env
    .gantry_cmd()
    .arg("prune")
    .args(["--older-than", "7d", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("removed_paths"))
    .stdout(predicate::str::contains("bytes_freed"))
    .stdout(predicate::str::contains("dry_run"));
}

#[test]
fn prune_leaves_foreign_directories_alone() {
  let env = TestEnv::empty();
  env.write_file("workspace/my-project/src/main.py", "print('hi')\n");
  env.write_file("workspace/my-project/requirements.txt", "requests==2.18.4\n");

  env
    .gantry_cmd()
    .arg("prune")
    .arg("--base")
    .arg(env.temp.path().join("workspace"))
    .args(["--older-than", "0s"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed: 0"))
    .stdout(predicate::str::contains("Skipped (not a cache): 1"));

  assert!(env.temp.path().join("workspace/my-project/src/main.py").exists());
  assert!(!env.temp.path().join("workspace/my-project/.lock").exists());
}
