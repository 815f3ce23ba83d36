//! Filesystem helpers for cache and install directories.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Total size in bytes of the regular files under `path`.
pub fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

/// Whether a directory entry name is bookkeeping rather than content.
pub fn is_hidden(name: &std::ffi::OsStr) -> bool {
  name.to_string_lossy().starts_with('.')
}

/// Remove a file, symlink or directory tree.
pub fn remove_entry(path: &Path) -> io::Result<()> {
  let meta = fs::symlink_metadata(path)?;
  if meta.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
}

/// Remove a path if it exists; a missing path is not an error.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
  match remove_entry(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

/// Move every top-level entry of `src` into `dest`, replacing same-named entries.
///
/// Both directories must be on the same filesystem.
pub fn move_entries(src: &Path, dest: &Path) -> io::Result<usize> {
  fs::create_dir_all(dest)?;
  let mut moved = 0;

  for entry in fs::read_dir(src)? {
    let entry = entry?;
    let target = dest.join(entry.file_name());
    remove_if_exists(&target)?;
    fs::rename(entry.path(), &target)?;
    moved += 1;
  }

  Ok(moved)
}
