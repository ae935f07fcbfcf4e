// Copyright 2018-2026 the project authors. MIT license.
//! Sidecar `.metadata.json` files (MetadataStore, spec 4.3).
//!
//! Grounded in the teacher's `cli/cache/http_cache/{mod,global}.rs`:
//! `CachedUrlMetadata` plus the `with_extension("metadata.json")` /
//! `read_metadata` / `write_metadata` pair.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::atomic_fs;
use crate::atomic_fs::CACHE_PERM;

pub type HeadersMap = HashMap<String, String>;

/// Metadata stored alongside a cached content file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedUrlMetadata {
  pub headers: HeadersMap,
  pub url: String,
}

impl CachedUrlMetadata {
  /// A redirect record carries nothing but a `location` header and an
  /// empty body (spec 4.3's redirect-record case).
  pub fn is_redirect(&self) -> bool {
    self.headers.contains_key("location")
  }
}

/// Derives the sidecar metadata path for a content file path, by
/// replacing the file's extension with `metadata.json`.
pub fn metadata_path(content_path: &Path) -> std::path::PathBuf {
  content_path.with_extension("metadata.json")
}

pub fn read(content_path: &Path) -> std::io::Result<Option<CachedUrlMetadata>> {
  let path = metadata_path(content_path);
  match atomic_fs::read(&path)? {
    Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
    None => Ok(None),
  }
}

pub fn write(
  content_path: &Path,
  metadata: &CachedUrlMetadata,
) -> std::io::Result<()> {
  let path = metadata_path(content_path);
  let json = serde_json::to_string_pretty(metadata)
    .expect("CachedUrlMetadata always serializes");
  atomic_fs::write_atomic(&path, json.as_bytes(), CACHE_PERM)
}
