// Copyright 2018-2026 the project authors. MIT license.
//! Atomic on-disk writes (AtomicFS, spec 4.2).
//!
//! Grounded in the teacher's `cli/fs_util.rs::atomic_write_file`/
//! `write_file`: write to a sibling temp file, set permission bits,
//! then rename over the destination. Temp suffix length follows
//! spec 4.2 ("two random bytes, hex") rather than the teacher's four.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use rand::Rng;

/// Default permission bits for cache content files (spec 4.2).
pub const CACHE_PERM: u32 = 0o644;

/// Reads the full contents of `path`, returning `Ok(None)` on a
/// not-found miss rather than an error (spec 4.2).
pub fn read(path: &Path) -> io::Result<Option<Vec<u8>>> {
  match std::fs::read(path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

/// Reads the full contents of `path` as UTF-8 text, returning `Ok(None)`
/// on a not-found miss.
pub fn read_to_string(path: &Path) -> io::Result<Option<String>> {
  match std::fs::read_to_string(path) {
    Ok(text) => Ok(Some(text)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

pub fn exists_file(path: &Path) -> bool {
  path.is_file()
}

/// Returns the mtime of `path` as whole seconds since the Unix epoch,
/// or `Ok(None)` if the path doesn't exist.
pub fn stat_mtime_seconds(path: &Path) -> io::Result<Option<u64>> {
  match std::fs::metadata(path) {
    Ok(meta) => {
      let modified = meta.modified()?;
      let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
      Ok(Some(secs))
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

/// Writes `data` to `path` atomically: write to `<path>.<hex>`, set
/// `mode`, then rename over `path`. Creates the parent directory if
/// missing, retrying the write once after doing so (a concurrent
/// cleanup could otherwise race the parent-dir creation).
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
  match write_atomic_once(path, data, mode) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      write_atomic_once(path, data, mode)
    }
    Err(e) => Err(e),
  }
}

fn write_atomic_once(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
  let tmp_path = sibling_temp_path(path);
  write_with_mode(&tmp_path, data, mode)?;
  std::fs::rename(&tmp_path, path).map_err(|e| {
    let _ = std::fs::remove_file(&tmp_path);
    e
  })
}

fn sibling_temp_path(path: &Path) -> PathBuf {
  let suffix: String = {
    let mut rng = rand::thread_rng();
    (0..2).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
  };
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  path.with_file_name(format!("{file_name}.{suffix}"))
}

fn write_with_mode(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
  use std::io::Write;
  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .open(path)?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode & 0o777))?;
  }
  #[cfg(not(unix))]
  let _ = mode;

  file.write_all(data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_write_atomic_creates_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("a").join("b").join("file.bin");
    write_atomic(&target, b"hello", CACHE_PERM).unwrap();
    assert_eq!(read(&target).unwrap().unwrap(), b"hello");
  }

  #[test]
  fn test_write_atomic_overwrites() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("file.bin");
    write_atomic(&target, b"first", CACHE_PERM).unwrap();
    write_atomic(&target, b"second", CACHE_PERM).unwrap();
    assert_eq!(read(&target).unwrap().unwrap(), b"second");
  }

  #[test]
  fn test_write_atomic_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("file.bin");
    write_atomic(&target, b"hello", CACHE_PERM).unwrap();
    let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(remaining.len(), 1);
  }

  #[test]
  fn test_read_missing_is_none() {
    let dir = TempDir::new().unwrap();
    assert!(read(&dir.path().join("missing")).unwrap().is_none());
  }

  #[test]
  fn test_write_atomic_cleans_up_temp_file_on_rename_failure() {
    // Renaming a file onto an existing non-empty directory fails on
    // every platform; the temp file must not be left behind.
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("file.bin");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("child"), b"x").unwrap();

    assert!(write_atomic(&target, b"hello", CACHE_PERM).is_err());
    let leftover: Vec<_> = std::fs::read_dir(dir.path())
      .unwrap()
      .map(|e| e.unwrap().file_name())
      .filter(|name| name != "file.bin")
      .collect();
    assert!(leftover.is_empty(), "temp file left behind: {leftover:?}");
  }

  #[cfg(unix)]
  #[test]
  fn test_write_atomic_sets_mode() {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("file.bin");
    write_atomic(&target, b"hello", 0o600).unwrap();
    let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
  }
}
