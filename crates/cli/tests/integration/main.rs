mod build_deps_tests;
mod common;
mod prune_tests;
mod status_tests;
