mod build_deps;
mod prune;
mod status;

pub use build_deps::{BuildDepsOptions, cmd_build_deps};
pub use prune::cmd_prune;
pub use status::cmd_status;
