//! Generated container scripts.
//!
//! Each phase runs one bash script inside the build image. Scripts are
//! rendered from the [`BuildRequest`] and written to a private temporary
//! directory that is mounted read-only at `/scripts`.
//!
//! A [`GeneratedScript`] owns that directory. [`GeneratedScript::close`]
//! removes it and reports failures; dropping it removes it silently, so the
//! script disappears on every exit path including unwinding.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::Phase;
use crate::consts::{ARTIFACT_MOUNT, INSTALL_TARGET, MARKER_FILENAME, SCRIPTS_MOUNT, SOURCE_MOUNT};
use crate::request::{BuildRequest, NativeLib};
use crate::util::hash::Fingerprint;

/// Prefix under which auxiliary native libraries are installed in the image.
const NATIVE_PREFIX: &str = "/opt/gantry";

const OPENSSL_VERSION: &str = "1.1.1w";
const LIBFFI_VERSION: &str = "3.4.4";
const LIBXML2_VERSION: &str = "2.9.14";
const LIBXSLT_VERSION: &str = "1.1.35";

/// A rendered script on disk, removed when closed or dropped.
#[derive(Debug)]
pub struct GeneratedScript {
  dir: TempDir,
  path: PathBuf,
  phase: Phase,
}

impl GeneratedScript {
  /// Write `content` as the phase's script in a fresh directory under the
  /// system temporary directory.
  pub fn write(phase: Phase, content: &str) -> io::Result<Self> {
    Self::write_in(&std::env::temp_dir(), phase, content)
  }

  /// Write `content` as the phase's script in a fresh directory under `base`.
  pub fn write_in(base: &Path, phase: Phase, content: &str) -> io::Result<Self> {
    fs::create_dir_all(base)?;
    let dir = tempfile::Builder::new().prefix(".gantry-scripts-").tempdir_in(base)?;
    let path = dir.path().join(phase.script_name());
    fs::write(&path, content)?;
    make_executable(&path)?;

    debug!(phase = %phase, path = %path.display(), "generated script written");
    Ok(Self { dir, path, phase })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Host directory mounted at `/scripts`.
  pub fn dir(&self) -> &Path {
    self.dir.path()
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// Path of the script as seen from inside the container.
  pub fn container_path(&self) -> String {
    format!("{}/{}", SCRIPTS_MOUNT, self.phase.script_name())
  }

  /// Remove the script and its directory.
  pub fn close(self) -> io::Result<()> {
    let dir = self.dir.path().to_path_buf();
    self.dir.close()?;
    debug!(path = %dir.display(), "generated script removed");
    Ok(())
  }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
  Ok(())
}

/// Quote a value for interpolation into a bash script.
fn quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}

fn header(request: &BuildRequest, phase: Phase) -> String {
  let abi = request.runtime().abi_tag();
  format!(
    r#"#!/bin/bash
# {phase} script for {service} ({runtime}), generated by gantry.
set -euo pipefail

PYBIN={pybin}
MANIFEST={source}/{manifest}
WHEELHOUSE={wheelhouse}
"#,
    phase = phase,
    service = request.service_name(),
    runtime = request.runtime(),
    pybin = abi.python_bin_dir(),
    source = SOURCE_MOUNT,
    manifest = quote(&request.manifest_file_name()),
    wheelhouse = ARTIFACT_MOUNT,
  )
}

fn native_lib_block(lib: NativeLib) -> String {
  let prefix = format!("{}/{}", NATIVE_PREFIX, lib.as_str());
  let build = match lib {
    NativeLib::Openssl => format!(
      r#"  curl -fsSL https://www.openssl.org/source/openssl-{v}.tar.gz | tar -xz -C /tmp
  (cd /tmp/openssl-{v} && ./config --prefix="$prefix" no-shared -fPIC && make -j"$(nproc)" && make install_sw)"#,
      v = OPENSSL_VERSION
    ),
    NativeLib::Libffi => format!(
      r#"  curl -fsSL https://github.com/libffi/libffi/releases/download/v{v}/libffi-{v}.tar.gz | tar -xz -C /tmp
  (cd /tmp/libffi-{v} && ./configure --prefix="$prefix" --disable-shared --with-pic && make -j"$(nproc)" && make install)"#,
      v = LIBFFI_VERSION
    ),
    NativeLib::Libxml => format!(
      r#"  curl -fsSL https://download.gnome.org/sources/libxml2/2.9/libxml2-{xml}.tar.xz | tar -xJ -C /tmp
  (cd /tmp/libxml2-{xml} && ./configure --prefix="$prefix" --without-python --disable-shared --with-pic && make -j"$(nproc)" && make install)
  curl -fsSL https://download.gnome.org/sources/libxslt/1.1/libxslt-{xslt}.tar.xz | tar -xJ -C /tmp
  (cd /tmp/libxslt-{xslt} && ./configure --prefix="$prefix" --with-libxml-prefix="$prefix" --without-python --disable-shared --with-pic && make -j"$(nproc)" && make install)"#,
      xml = LIBXML2_VERSION,
      xslt = LIBXSLT_VERSION
    ),
  };

  format!(
    r#"
# {name}
prefix={prefix}
if [ ! -f "$prefix/.built" ]; then
{build}
  touch "$prefix/.built"
fi
export PATH="$prefix/bin:$PATH"
export CFLAGS="-I$prefix/include ${{CFLAGS:-}}"
export LDFLAGS="-L$prefix/lib ${{LDFLAGS:-}}"
export PKG_CONFIG_PATH="$prefix/lib/pkgconfig:${{PKG_CONFIG_PATH:-}}"
"#,
    name = lib.as_str(),
    prefix = prefix,
    build = build,
  )
}

/// Render the build script.
///
/// Extra system packages and auxiliary libraries are installed first, then
/// every manifest entry is compiled from source. Platform wheels are repaired
/// into the wheelhouse, pure wheels are copied as they are. The checksum
/// marker is written last, through a rename, so a marker only ever exists
/// next to a complete set of wheels.
pub fn build_script(request: &BuildRequest, fingerprint: &Fingerprint) -> String {
  let mut script = header(request, Phase::Build);

  if !request.extra_system_packages().is_empty() {
    script.push_str(&format!(
      "\nyum install -y {}\n",
      request.extra_system_packages().join(" ")
    ));
  }

  for lib in request.build_flags() {
    script.push_str(&native_lib_block(*lib));
  }

  script.push_str(&format!(
    r#"
rm -rf /tmp/wheels && mkdir -p /tmp/wheels "$WHEELHOUSE"
"$PYBIN/pip" wheel --no-binary :all: -r "$MANIFEST" -w /tmp/wheels

for whl in /tmp/wheels/*.whl; do
  [ -e "$whl" ] || continue
  case "$whl" in
    *-none-any.whl) cp "$whl" "$WHEELHOUSE/" ;;
    *) auditwheel repair "$whl" -w "$WHEELHOUSE/" ;;
  esac
done

echo {fingerprint} > "$WHEELHOUSE/.{marker}.tmp"
mv "$WHEELHOUSE/.{marker}.tmp" "$WHEELHOUSE/{marker}"
"#,
    fingerprint = fingerprint,
    marker = MARKER_FILENAME,
  ));

  script
}

/// Render the install script.
///
/// Installs from the wheelhouse only, never from a package index, into an
/// emptied directory inside the container.
pub fn install_script(request: &BuildRequest) -> String {
  let mut script = header(request, Phase::Install);
  script.push_str(&format!(
    r#"
rm -rf {target} && mkdir -p {target}
"$PYBIN/pip" install --no-index --find-links "$WHEELHOUSE" -r "$MANIFEST" -t {target}
"#,
    target = INSTALL_TARGET,
  ));
  script
}
