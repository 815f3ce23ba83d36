//! Manifest fingerprinting.
//!
//! A `Fingerprint` is the SHA-1 of a dependency manifest's raw bytes. It is a
//! change-detection key for the build cache, not a security boundary, and it
//! is recomputed on every cache check.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Length of a rendered fingerprint (hex characters).
pub const FINGERPRINT_LEN: usize = 40;

/// A content hash identifying a dependency manifest.
///
/// # Format
///
/// Lowercase hexadecimal, 40 characters, e.g. `"da39a3ee5e6b4b0d3255bfef95601890afd80709"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Fingerprint an in-memory byte sequence.
  pub fn of_bytes(data: &[u8]) -> Self {
    let mut hasher = Sha1::new();
    hasher.update(data);
    Fingerprint(hex::encode(hasher.finalize()))
  }

  /// Fingerprint a file's raw contents.
  ///
  /// I/O errors are returned unmodified.
  pub fn of_file(path: &Path) -> io::Result<Self> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8192];

    loop {
      let bytes_read = file.read(&mut buffer)?;
      if bytes_read == 0 {
        break;
      }
      hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Abbreviated form for log lines.
  pub fn short(&self) -> &str {
    self.0.get(..12).unwrap_or(&self.0)
  }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid fingerprint {0:?}: expected {FINGERPRINT_LEN} hex characters")]
pub struct InvalidFingerprint(pub String);

impl TryFrom<String> for Fingerprint {
  type Error = InvalidFingerprint;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse()
  }
}

impl From<Fingerprint> for String {
  fn from(fingerprint: Fingerprint) -> Self {
    fingerprint.0
  }
}

impl FromStr for Fingerprint {
  type Err = InvalidFingerprint;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.len() == FINGERPRINT_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
      Ok(Fingerprint(s.to_ascii_lowercase()))
    } else {
      Err(InvalidFingerprint(s.to_string()))
    }
  }
}
