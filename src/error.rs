// Copyright 2018-2026 the project authors. MIT license.
//! Error types, one narrow enum per component widened into
//! [`ModCacheError`] at the Fetcher/Loader boundary (spec 7).
//!
//! Grounded in the teacher's pattern of returning narrow errors from
//! leaf components (`UrlToFilenameConversionError` in `global.rs`) and
//! a crate-wide `AnyError` further up; this crate swaps `anyhow`'s
//! `AnyError` for a closed `thiserror` enum since the whole surface is
//! known up front.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::path::UnsupportedUrlError;

/// Errors from the on-disk cache backends (spec 4.4/4.5).
#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  UnsupportedUrl(#[from] UnsupportedUrlError),
  #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    url: String,
    expected: String,
    actual: String,
  },
  #[error("i/o error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("malformed sidecar at {path}")]
  Parse { path: PathBuf },
}

/// Top-level error surfaced by the Fetcher and Loader, matching spec 7
/// one-for-one.
#[derive(Debug, Error)]
pub enum ModCacheError {
  #[error("unsupported scheme \"{scheme}\" in {url}")]
  UnsupportedScheme { scheme: String, url: String },
  #[error(transparent)]
  UnsupportedUrl(#[from] UnsupportedUrlError),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("permission denied fetching remote url: {0}")]
  PermissionDenied(String),
  #[error("http status {status} ({status_text}) fetching {url}")]
  HttpStatus {
    status: u16,
    status_text: String,
    url: String,
  },
  #[error("too many redirects resolving {0}")]
  TooManyRedirects(String),
  #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    url: String,
    expected: String,
    actual: String,
  },
  #[error("i/o error on {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("malformed sidecar at {0}")]
  ParseError(PathBuf),
}

impl From<CacheError> for ModCacheError {
  fn from(err: CacheError) -> Self {
    match err {
      CacheError::UnsupportedUrl(e) => ModCacheError::UnsupportedUrl(e),
      CacheError::ChecksumMismatch { url, expected, actual } => {
        ModCacheError::ChecksumMismatch { url, expected, actual }
      }
      CacheError::Io { path, source } => ModCacheError::IoError { path, source },
      CacheError::Parse { path } => ModCacheError::ParseError(path),
    }
  }
}
