// Copyright 2018-2026 the project authors. MIT license.
//! Cache root discovery (spec 6), grounded in the teacher's
//! `cli/cache/deno_dir.rs`: the same explicit-root → `DENO_DIR` →
//! platform cache dir → `$HOME/.deno` precedence, and the same
//! hand-rolled `dirs` shims (the teacher avoids the `dirs` crate; this
//! crate follows suit rather than adding a dependency the teacher
//! deliberately doesn't carry).

use std::path::PathBuf;

/// The discovered cache root plus its two fixed subdirectories.
#[derive(Debug, Clone)]
pub struct CacheRoot {
  pub root: PathBuf,
}

impl CacheRoot {
  /// Resolves the cache root per spec 6's precedence: an explicit
  /// root, then `DENO_DIR`, then the platform cache dir, then
  /// `$HOME/.deno`. Relative explicit roots are resolved against the
  /// current directory.
  pub fn discover(explicit_root: Option<PathBuf>) -> std::io::Result<Self> {
    let chosen = explicit_root
      .or_else(|| std::env::var_os("DENO_DIR").map(PathBuf::from))
      .or_else(|| dirs::cache_dir().map(|d| d.join("deno")))
      .or_else(|| dirs::home_dir().map(|d| d.join(".deno")));

    let Some(root) = chosen else {
      return Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "could not determine a cache root: no explicit root, DENO_DIR, platform cache dir, or home dir",
      ));
    };
    let root = if root.is_absolute() {
      root
    } else {
      std::env::current_dir()?.join(root)
    };
    Ok(Self { root })
  }

  /// `<root>/remote` — the HTTP cache (content + sidecar).
  pub fn remote_folder_path(&self) -> PathBuf {
    self.root.join("remote")
  }

  /// `<root>/gen` — reserved for downstream emitted artifacts; this
  /// crate never writes there itself.
  pub fn gen_folder_path(&self) -> PathBuf {
    self.root.join("gen")
  }
}

#[cfg(not(windows))]
mod dirs {
  use std::path::PathBuf;

  pub fn cache_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
      home_dir().map(|h| h.join("Library/Caches"))
    } else {
      std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".cache")))
    }
  }

  pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
      .and_then(|h| if h.is_empty() { None } else { Some(h) })
      .or_else(|| unsafe { fallback() })
      .map(PathBuf::from)
  }

  /// Matches the (deprecated) `std::env::home_dir` Unix implementation:
  /// fall back to the password database entry when `$HOME` is unset.
  unsafe fn fallback() -> Option<std::ffi::OsString> {
    let amt = match libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) {
      n if n < 0 => 512_usize,
      n => n as usize,
    };
    let mut buf = Vec::with_capacity(amt);
    let mut passwd: libc::passwd = std::mem::zeroed();
    let mut result = std::ptr::null_mut();
    match libc::getpwuid_r(
      libc::getuid(),
      &mut passwd,
      buf.as_mut_ptr(),
      buf.capacity(),
      &mut result,
    ) {
      0 if !result.is_null() => {
        let ptr = passwd.pw_dir as *const _;
        let bytes = std::ffi::CStr::from_ptr(ptr).to_bytes().to_vec();
        Some(std::os::unix::ffi::OsStringExt::from_vec(bytes))
      }
      _ => None,
    }
  }
}

#[cfg(windows)]
mod dirs {
  use std::ffi::OsString;
  use std::os::windows::ffi::OsStringExt;
  use std::path::PathBuf;
  use winapi::shared::winerror;
  use winapi::um::combaseapi;
  use winapi::um::knownfolders;
  use winapi::um::shlobj;
  use winapi::um::shtypes;
  use winapi::um::winbase;
  use winapi::um::winnt;

  fn known_folder(folder_id: shtypes::REFKNOWNFOLDERID) -> Option<PathBuf> {
    unsafe {
      let mut path_ptr: winnt::PWSTR = std::ptr::null_mut();
      let result =
        shlobj::SHGetKnownFolderPath(folder_id, 0, std::ptr::null_mut(), &mut path_ptr);
      if result == winerror::S_OK {
        let len = winbase::lstrlenW(path_ptr) as usize;
        let path = std::slice::from_raw_parts(path_ptr, len);
        let ostr: OsString = OsStringExt::from_wide(path);
        combaseapi::CoTaskMemFree(path_ptr as *mut winapi::ctypes::c_void);
        Some(PathBuf::from(ostr))
      } else {
        None
      }
    }
  }

  pub fn cache_dir() -> Option<PathBuf> {
    known_folder(&knownfolders::FOLDERID_LocalAppData)
  }

  pub fn home_dir() -> Option<PathBuf> {
    if let Some(userprofile) = std::env::var_os("USERPROFILE") {
      if !userprofile.is_empty() {
        return Some(PathBuf::from(userprofile));
      }
    }
    known_folder(&knownfolders::FOLDERID_Profile)
  }
}
