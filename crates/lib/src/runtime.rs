//! Function runtimes and their binary-interface tags.

use std::str::FromStr;

use serde::Serialize;

/// Default build image: a manylinux image with every supported CPython under
/// `/opt/python/<abi-tag>/bin`.
pub const DEFAULT_BUILD_IMAGE: &str = "quay.io/pypa/manylinux1_x86_64";

/// Supported function runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Runtime {
  #[serde(rename = "python2.7")]
  Python27,
  #[serde(rename = "python3.6")]
  Python36,
  #[serde(rename = "python3.7")]
  Python37,
  #[serde(rename = "python3.8")]
  Python38,
  #[serde(rename = "python3.9")]
  Python39,
}

impl Runtime {
  pub const ALL: &'static [Runtime] = &[
    Runtime::Python27,
    Runtime::Python36,
    Runtime::Python37,
    Runtime::Python38,
    Runtime::Python39,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Runtime::Python27 => "python2.7",
      Runtime::Python36 => "python3.6",
      Runtime::Python37 => "python3.7",
      Runtime::Python38 => "python3.8",
      Runtime::Python39 => "python3.9",
    }
  }

  /// CPython ABI tag the runtime's interpreter was built with.
  ///
  /// The deployment target's 2.7 interpreter uses the wide-unicode ABI.
  pub fn abi_tag(self) -> AbiTag {
    let tag = match self {
      Runtime::Python27 => "cp27-cp27mu",
      Runtime::Python36 => "cp36-cp36m",
      Runtime::Python37 => "cp37-cp37m",
      Runtime::Python38 => "cp38-cp38",
      Runtime::Python39 => "cp39-cp39",
    };
    AbiTag(tag)
  }

  pub fn default_image(self) -> &'static str {
    DEFAULT_BUILD_IMAGE
  }
}

impl std::fmt::Display for Runtime {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported runtime '{name}' (supported: {})", supported_list())]
pub struct UnknownRuntime {
  pub name: String,
}

fn supported_list() -> String {
  Runtime::ALL.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}

impl FromStr for Runtime {
  type Err = UnknownRuntime;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Runtime::ALL
      .iter()
      .copied()
      .find(|r| r.as_str() == s)
      .ok_or_else(|| UnknownRuntime { name: s.to_string() })
  }
}

/// Platform/ABI tag of compiled artifacts, e.g. `cp36-cp36m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbiTag(&'static str);

impl AbiTag {
  pub fn as_str(self) -> &'static str {
    self.0
  }

  /// Interpreter bin directory inside the build image.
  pub fn python_bin_dir(self) -> String {
    format!("/opt/python/{}/bin", self.0)
  }
}

impl std::fmt::Display for AbiTag {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.0)
  }
}
