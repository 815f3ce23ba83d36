//! Names and defaults shared across the crate.

use std::time::Duration;

pub const APP_NAME: &str = "gantry";

/// Project configuration file looked up in the project root.
pub const CONFIG_FILENAME: &str = "gantry.yml";

/// Checksum marker written into the cache root after a successful build.
pub const MARKER_FILENAME: &str = "sha1sum";

/// Advisory lock file inside the cache root.
pub const LOCK_FILENAME: &str = ".lock";

/// Prefix of the hidden staging directories used during extraction.
pub const STAGING_PREFIX: &str = ".extract-";

/// Default dependency manifest, relative to the function source directory.
pub const DEFAULT_MANIFEST: &str = "requirements.txt";

/// Default install directory, relative to the project root.
pub const DEFAULT_INSTALL_DIR: &str = "./lib";

/// Mount points inside the isolated environment.
pub const ARTIFACT_MOUNT: &str = "/wheelhouse";
pub const SOURCE_MOUNT: &str = "/src";
pub const SCRIPTS_MOUNT: &str = "/scripts";
pub const INSTALL_TARGET: &str = "/install";

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Environment variables resolved once at the CLI boundary.
pub const FORCE_REBUILD_ENV: &str = "FORCE_DEPS_REBUILD";
pub const FORCE_CLEANUP_ENV: &str = "FORCE_DEPS_CLEANUP";
pub const CI_MARKER_ENV: &str = "CIRCLECI";
pub const CI_ARTIFACTS_ENV: &str = "CIRCLE_ARTIFACTS";

/// Length of the abbreviated container id used in log file names.
pub const SHORT_ID_LEN: usize = 12;
