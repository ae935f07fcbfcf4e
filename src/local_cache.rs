// Copyright 2018-2026 the project authors. MIT license.
//! Path-decoded vendor overlay atop the global cache (LocalCache,
//! spec 4.5). Grounded in the teacher's
//! `cli/cache/http_cache/local.rs`.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::atomic_fs;
use crate::atomic_fs::CACHE_PERM;
use crate::cache::HttpCache;
use crate::cache::HttpCacheItemKey;
use crate::checksum;
use crate::error::CacheError;
use crate::global_cache::GlobalHttpCache;
use crate::metadata::CachedUrlMetadata;
use crate::metadata::HeadersMap;
use crate::path::base_url_to_filename_parts;
use crate::path::Destination;
use crate::path::UnsupportedUrlError;

/// Header names persisted to the on-disk manifest (spec-full
/// "supplemented feature" 3). Anything else is dropped across a
/// process restart unless the entry is re-copied from the global
/// cache.
const HEADER_KEYS_TO_KEEP: [&str; 4] =
  ["content-type", "location", "x-typescript-types", "x-deno-warning"];

#[derive(Debug)]
pub struct LocalHttpCache {
  path: PathBuf,
  manifest: LocalCacheManifest,
  global_cache: Arc<GlobalHttpCache>,
  /// When false (default for readonly vendor roots), misses are never
  /// backfilled from the global cache (spec 4.5, scenario 9).
  allow_global_to_local_copy: bool,
}

impl LocalHttpCache {
  pub fn new(
    path: PathBuf,
    global_cache: Arc<GlobalHttpCache>,
    allow_global_to_local_copy: bool,
  ) -> Self {
    assert!(path.is_absolute());
    let manifest = LocalCacheManifest::new(path.join("manifest.json"));
    Self { path, manifest, global_cache, allow_global_to_local_copy }
  }

  fn cache_filepath(
    &self,
    url: &Url,
    destination: Destination,
  ) -> Result<PathBuf, UnsupportedUrlError> {
    Ok(url_to_local_sub_path(url, destination)?.as_path_from_root(&self.path))
  }

  fn cache_filepath_from_key<'a>(
    &self,
    key: &'a HttpCacheItemKey,
  ) -> Result<Cow<'a, PathBuf>, UnsupportedUrlError> {
    match &key.file_path {
      Some(path) => Ok(Cow::Borrowed(path)),
      None => Ok(Cow::Owned(self.cache_filepath(key.url, key.destination)?)),
    }
  }

  /// Copies bytes and headers from the global cache into the local
  /// layout, verifying the global entry's content against its own
  /// stored checksum semantics is not needed here: the global `get`
  /// path already exists for that; this only moves bytes it already
  /// trusts (the global entry was itself checksum-verified on write).
  fn check_copy_global_to_local(
    &self,
    local_key: &HttpCacheItemKey,
  ) -> Result<bool, CacheError> {
    if !self.allow_global_to_local_copy {
      return Ok(false);
    }
    let global_key = self
      .global_cache
      .cache_item_key(local_key.url, local_key.destination)?;
    let Some(cached_bytes) = self.global_cache.read_file_bytes(&global_key)? else {
      return Ok(false);
    };
    let Some(metadata) = self.global_cache.read_metadata(&global_key)? else {
      return Ok(false);
    };

    let is_redirect = metadata.headers.contains_key("location");
    if !is_redirect {
      let local_file_path = self.cache_filepath_from_key(local_key)?;
      if let Some(parent) = local_file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
          path: parent.to_path_buf(),
          source,
        })?;
      }
      atomic_fs::write_atomic(&local_file_path, &cached_bytes, CACHE_PERM)
        .map_err(|source| CacheError::Io { path: local_file_path.to_path_buf(), source })?;
    }
    self.manifest.insert_data(
      url_to_local_sub_path(local_key.url, local_key.destination)?,
      local_key.url.clone(),
      local_key.destination,
      metadata.headers,
    );

    Ok(true)
  }
}

impl HttpCache for LocalHttpCache {
  fn cache_item_key<'a>(
    &self,
    url: &'a Url,
    destination: Destination,
  ) -> Result<HttpCacheItemKey<'a>, CacheError> {
    let file_path = if self.manifest.has_redirect(url, destination) {
      None
    } else {
      Some(self.cache_filepath(url, destination)?)
    };
    Ok(HttpCacheItemKey {
      #[cfg(debug_assertions)]
      is_local_key: true,
      url,
      destination,
      file_path,
    })
  }

  fn verifies_checksum(&self) -> bool {
    false
  }

  fn contains(&self, url: &Url, destination: Destination) -> bool {
    if self.manifest.has_redirect(url, destination) {
      return true;
    }
    match self.cache_filepath(url, destination) {
      Ok(path) => path.is_file(),
      Err(_) => false,
    }
  }

  fn set(
    &self,
    url: &Url,
    destination: Destination,
    headers: HeadersMap,
    content: &[u8],
  ) -> Result<(), CacheError> {
    let is_redirect = headers.contains_key("location");
    if !is_redirect {
      let path = self.cache_filepath(url, destination)?;
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
          .map_err(|source| CacheError::Io { path: parent.to_path_buf(), source })?;
      }
      atomic_fs::write_atomic(&path, content, CACHE_PERM)
        .map_err(|source| CacheError::Io { path, source })?;
    }
    let sub_path = url_to_local_sub_path(url, destination)?;
    self.manifest.insert_data(sub_path, url.clone(), destination, headers);
    Ok(())
  }

  fn read_modified_time(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<SystemTime>, CacheError> {
    let file_path = if self.manifest.has_redirect(key.url, key.destination) {
      Cow::Borrowed(&self.manifest.file_path)
    } else {
      self.cache_filepath_from_key(key)?
    };
    match std::fs::metadata(&*file_path) {
      Ok(meta) => Ok(Some(
        meta.modified().map_err(|source| CacheError::Io { path: file_path.to_path_buf(), source })?,
      )),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        if self.check_copy_global_to_local(key)? {
          return self.read_modified_time(key);
        }
        Ok(None)
      }
      Err(source) => Err(CacheError::Io { path: file_path.to_path_buf(), source }),
    }
  }

  fn read_file_bytes(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<Vec<u8>>, CacheError> {
    let cache_filepath = match key.file_path.as_ref() {
      Some(file_path) => file_path,
      None => return Ok(Some(Vec::new())),
    };
    if self.manifest.has_redirect(key.url, key.destination) {
      return Ok(Some(Vec::new()));
    }
    match atomic_fs::read(cache_filepath)
      .map_err(|source| CacheError::Io { path: cache_filepath.clone(), source })?
    {
      Some(bytes) => Ok(Some(bytes)),
      None => {
        if self.check_copy_global_to_local(key)? {
          self.read_file_bytes(key)
        } else {
          Ok(None)
        }
      }
    }
  }

  fn read_metadata(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<CachedUrlMetadata>, CacheError> {
    if let Some(metadata) = self.manifest.get_metadata(key.url, key.destination) {
      Ok(Some(metadata))
    } else if self.check_copy_global_to_local(key)? {
      Ok(self.manifest.get_metadata(key.url, key.destination))
    } else {
      Ok(None)
    }
  }
}

struct LocalCacheSubPath {
  has_hash: bool,
  parts: Vec<String>,
}

impl LocalCacheSubPath {
  fn as_path_from_root(&self, root_path: &Path) -> PathBuf {
    let mut path = root_path.to_path_buf();
    for part in &self.parts {
      path.push(part);
    }
    path
  }
}

static FORBIDDEN_CHARS: Lazy<HashSet<char>> =
  Lazy::new(|| HashSet::from(['?', '<', '>', ':', '*', '|', '\\', '"', '\'', '/']));

fn has_forbidden_chars(segment: &str) -> bool {
  segment.chars().any(|c| {
    let is_uppercase = c.is_ascii_alphabetic() && !c.is_ascii_lowercase();
    FORBIDDEN_CHARS.contains(&c) || is_uppercase
  })
}

fn has_known_extension(path: &str) -> bool {
  let path = path.to_lowercase();
  ["js", "ts", "jsx", "tsx", "mts", "mjs", "json", "wasm"]
    .iter()
    .any(|ext| path.ends_with(&format!(".{ext}")))
}

fn short_hash(data: &str) -> String {
  let checksum = checksum::gen(&[data.as_bytes()]);
  let sub = data
    .to_lowercase()
    .chars()
    .filter(|c| !FORBIDDEN_CHARS.contains(c))
    .take(20)
    .collect::<String>();
  if sub.is_empty() {
    format!("#{}", &checksum[..7])
  } else {
    format!("#{}_{}", &sub, &checksum[..5])
  }
}

fn should_hash_part(part: &str, is_last: bool) -> bool {
  let hash_context_specific = if is_last {
    !has_known_extension(part)
  } else {
    has_known_extension(part)
  };
  hash_context_specific || part.starts_with('#') || has_forbidden_chars(part)
}

fn url_to_local_sub_path(
  url: &Url,
  destination: Destination,
) -> Result<LocalCacheSubPath, UnsupportedUrlError> {
  let port_separator = "_";
  let Some(base_parts) = base_url_to_filename_parts(url, port_separator) else {
    return Err(UnsupportedUrlError { url: url.to_string() });
  };

  let path_segments = url
    .path_segments()
    .ok_or_else(|| UnsupportedUrlError { url: url.to_string() })?;
  let mut parts = base_parts
    .into_iter()
    .chain(path_segments.map(|s| s.to_string()))
    .collect::<Vec<_>>();

  if let Some(query) = url.query() {
    let last = parts.last_mut().unwrap();
    last.push('?');
    last.push_str(query);
  }
  if destination == Destination::Json {
    let last = parts.last_mut().unwrap();
    last.push_str("\u{0}json");
  }

  let mut has_hash = false;
  let parts_len = parts.len();
  let parts = parts
    .into_iter()
    .enumerate()
    .map(|(i, part)| {
      let is_last = i == parts_len - 1;
      if should_hash_part(&part, is_last) {
        has_hash = true;
        short_hash(&part)
      } else {
        part
      }
    })
    .collect::<Vec<_>>();

  Ok(LocalCacheSubPath { has_hash, parts })
}

fn manifest_key(url: &Url, destination: Destination) -> String {
  match destination {
    Destination::Script => url.to_string(),
    Destination::Json => format!("{url}\u{0}json"),
  }
}

#[derive(Debug, Default, Clone)]
struct LocalCacheManifestData {
  serialized: SerializedLocalCacheManifestData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SerializedLocalCacheManifestDataModule {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default = "IndexMap::new", skip_serializing_if = "IndexMap::is_empty")]
  pub headers: IndexMap<String, String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SerializedLocalCacheManifestData {
  pub modules: IndexMap<String, SerializedLocalCacheManifestDataModule>,
}

#[derive(Debug)]
struct LocalCacheManifest {
  file_path: PathBuf,
  data: RwLock<LocalCacheManifestData>,
}

impl LocalCacheManifest {
  fn new(file_path: PathBuf) -> Self {
    let serialized: SerializedLocalCacheManifestData = std::fs::read(&file_path)
      .ok()
      .and_then(|data| {
        serde_json::from_slice(&data)
          .inspect_err(|e| log::debug!("failed deserializing manifest {}: {e}", file_path.display()))
          .ok()
      })
      .unwrap_or_default();
    Self { data: RwLock::new(LocalCacheManifestData { serialized }), file_path }
  }

  fn has_redirect(&self, url: &Url, destination: Destination) -> bool {
    self
      .get_metadata(url, destination)
      .map(|m| m.headers.contains_key("location"))
      .unwrap_or(false)
  }

  fn insert_data(
    &self,
    sub_path: LocalCacheSubPath,
    url: Url,
    destination: Destination,
    mut original_headers: HeadersMap,
  ) {
    let mut headers_subset = IndexMap::new();
    for key in HEADER_KEYS_TO_KEEP {
      if let Some((k, v)) = original_headers.remove_entry(key) {
        headers_subset.insert(k, v);
      }
    }

    let key = manifest_key(&url, destination);
    let mut data = self.data.write();
    let is_empty = headers_subset.is_empty() && !sub_path.has_hash;
    let has_changed = if is_empty {
      data.serialized.modules.shift_remove(&key).is_some()
    } else {
      let new_data = SerializedLocalCacheManifestDataModule {
        path: if headers_subset.contains_key("location") {
          None
        } else {
          Some(sub_path.parts.join("/"))
        },
        headers: headers_subset,
      };
      if data.serialized.modules.get(&key) == Some(&new_data) {
        false
      } else {
        data.serialized.modules.insert(key, new_data);
        true
      }
    };

    if has_changed {
      let json = serde_json::to_string_pretty(&data.serialized)
        .expect("manifest data always serializes");
      if let Err(e) = atomic_fs::write_atomic(&self.file_path, json.as_bytes(), CACHE_PERM) {
        log::warn!("failed writing manifest {}: {e}", self.file_path.display());
      }
    }
  }

  fn get_metadata(&self, url: &Url, destination: Destination) -> Option<CachedUrlMetadata> {
    let key = manifest_key(url, destination);
    let data = self.data.read();
    let Some(module) = data.serialized.modules.get(&key) else {
      let folder_path = self.file_path.parent().unwrap();
      let sub_path = url_to_local_sub_path(url, destination).ok()?;
      if sub_path.has_hash {
        return None;
      }
      let file_path = sub_path.as_path_from_root(folder_path);
      return if file_path.exists() {
        Some(CachedUrlMetadata { headers: Default::default(), url: url.to_string() })
      } else {
        None
      };
    };
    let headers = module
      .headers
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    Some(CachedUrlMetadata { headers, url: url.to_string() })
  }
}
