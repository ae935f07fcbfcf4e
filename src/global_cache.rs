// Copyright 2018-2026 the project authors. MIT license.
//! The canonical, hash-keyed store (GlobalCache, spec 4.4).
//!
//! Grounded in the teacher's `cli/cache/http_cache/global.rs`.

use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use url::Url;

use crate::atomic_fs;
use crate::atomic_fs::CACHE_PERM;
use crate::cache::HttpCache;
use crate::cache::HttpCacheItemKey;
use crate::checksum;
use crate::error::CacheError;
use crate::metadata;
use crate::metadata::CachedUrlMetadata;
use crate::metadata::HeadersMap;
use crate::path::Destination;
use crate::path::url_to_filename;

#[derive(Debug)]
pub struct GlobalHttpCache {
  root: PathBuf,
}

impl GlobalHttpCache {
  pub fn new(root: PathBuf) -> Self {
    assert!(root.is_absolute());
    Self { root }
  }

  fn cache_filepath(
    &self,
    url: &Url,
    destination: Destination,
  ) -> Result<PathBuf, CacheError> {
    Ok(self.root.join(url_to_filename(url, destination)?))
  }

  /// Where the file is stored and how it's stored should be an
  /// implementation detail; kept for legacy callers (e.g. a `info`
  /// subcommand) that need a concrete path to display.
  #[deprecated(note = "do not assume the cache is stored at a file path")]
  pub fn get_global_cache_location(&self) -> &Path {
    &self.root
  }

  #[deprecated(note = "do not assume the cache is stored at a file path")]
  pub fn get_global_cache_filepath(
    &self,
    url: &Url,
    destination: Destination,
  ) -> Result<PathBuf, CacheError> {
    self.cache_filepath(url, destination)
  }

  /// Reads the sidecar only, skipping the (possibly large) content file.
  pub fn get_headers(
    &self,
    url: &Url,
    destination: Destination,
  ) -> Result<Option<HeadersMap>, CacheError> {
    let path = self.cache_filepath(url, destination)?;
    Ok(read_metadata(&path)?.map(|m| m.headers))
  }

  /// Reads sidecar and content; verifies `checksum` (case-insensitive
  /// hex) against the content bytes when provided.
  pub fn get(
    &self,
    url: &Url,
    destination: Destination,
    checksum: Option<&str>,
  ) -> Result<Option<(HeadersMap, Vec<u8>)>, CacheError> {
    let path = self.cache_filepath(url, destination)?;
    let Some(metadata) = read_metadata(&path)? else {
      return Ok(None);
    };
    let Some(content) = read_bytes(&path)? else {
      return Ok(None);
    };
    if let Some(expected) = checksum {
      let actual = checksum::gen(&[&content]);
      if !checksum::matches(expected, &actual) {
        return Err(CacheError::ChecksumMismatch {
          url: url.to_string(),
          expected: expected.to_string(),
          actual,
        });
      }
    }
    Ok(Some((metadata.headers, content)))
  }

  /// Writes content and sidecar atomically. A read-only instance never
  /// calls this method; read-only enforcement lives in the Fetcher,
  /// which is where the permission is actually determined (spec 5).
  pub fn set(
    &self,
    url: &Url,
    destination: Destination,
    headers: HeadersMap,
    content: &[u8],
  ) -> Result<(), CacheError> {
    let path = self.cache_filepath(url, destination)?;
    atomic_fs::write_atomic(&path, content, CACHE_PERM).map_err(|source| {
      CacheError::Io { path: path.clone(), source }
    })?;
    let metadata = CachedUrlMetadata {
      headers,
      url: url.to_string(),
    };
    write_metadata(&path, &metadata)?;
    Ok(())
  }
}

impl HttpCache for GlobalHttpCache {
  fn cache_item_key<'a>(
    &self,
    url: &'a Url,
    destination: Destination,
  ) -> Result<HttpCacheItemKey<'a>, CacheError> {
    let file_path = self.cache_filepath(url, destination)?;
    Ok(HttpCacheItemKey {
      #[cfg(debug_assertions)]
      is_local_key: false,
      url,
      destination,
      file_path: Some(file_path),
    })
  }

  fn contains(&self, url: &Url, destination: Destination) -> bool {
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
    GlobalHttpCache::set(self, url, destination, headers, content)
  }

  fn read_modified_time(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<SystemTime>, CacheError> {
    let path = key.file_path.as_ref().expect("global keys always have a path");
    match std::fs::metadata(path) {
      Ok(meta) => Ok(Some(meta.modified().map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
      })?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(CacheError::Io { path: path.clone(), source }),
    }
  }

  fn read_file_bytes(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<Vec<u8>>, CacheError> {
    let path = key.file_path.as_ref().expect("global keys always have a path");
    read_bytes(path)
  }

  fn read_metadata(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<CachedUrlMetadata>, CacheError> {
    let path = key.file_path.as_ref().expect("global keys always have a path");
    read_metadata(path)
  }
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
  atomic_fs::read(path).map_err(|source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  })
}

fn read_metadata(path: &Path) -> Result<Option<CachedUrlMetadata>, CacheError> {
  metadata::read(path).map_err(|source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  })
}

fn write_metadata(path: &Path, meta: &CachedUrlMetadata) -> Result<(), CacheError> {
  metadata::write(path, meta).map_err(|source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn abs(dir: &TempDir) -> PathBuf {
    dir.path().to_path_buf()
  }

  #[test]
  fn test_create_cache_lazily() {
    let dir = TempDir::new().unwrap();
    let cache_path = abs(&dir).join("foobar");
    let cache = GlobalHttpCache::new(cache_path.clone());
    assert!(!cache_path.exists());
    let url = Url::parse("http://example.com/foo/bar.js").unwrap();
    cache.set(&url, Destination::Script, HeadersMap::new(), b"hello world").unwrap();
    assert!(cache_path.is_dir());
  }

  #[test]
  fn test_get_set() {
    let dir = TempDir::new().unwrap();
    let cache = GlobalHttpCache::new(abs(&dir));
    let url = Url::parse("https://deno.land/x/welcome.ts").unwrap();
    let mut headers = HeadersMap::new();
    headers.insert("content-type".to_string(), "application/javascript".to_string());
    headers.insert("etag".to_string(), "as5625rqdsfb".to_string());
    cache.set(&url, Destination::Script, headers, b"Hello world").unwrap();

    let (headers, content) = cache.get(&url, Destination::Script, None).unwrap().unwrap();
    assert_eq!(content, b"Hello world");
    assert_eq!(headers.get("content-type").unwrap(), "application/javascript");
    assert_eq!(headers.get("foobar"), None);
  }

  #[test]
  fn test_checksum_verification() {
    let dir = TempDir::new().unwrap();
    let cache = GlobalHttpCache::new(abs(&dir));
    let url = Url::parse("https://deno.land/x/a.ts").unwrap();
    cache.set(&url, Destination::Script, HeadersMap::new(), b"hello world").unwrap();
    let good = checksum::gen(&[b"hello world"]);
    assert!(cache.get(&url, Destination::Script, Some(&good)).unwrap().is_some());
    let result = cache.get(&url, Destination::Script, Some("deadbeef"));
    assert!(matches!(result, Err(CacheError::ChecksumMismatch { .. })));
  }

  #[test]
  fn test_checksum_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let cache = GlobalHttpCache::new(abs(&dir));
    let url = Url::parse("https://deno.land/x/a.ts").unwrap();
    cache.set(&url, Destination::Script, HeadersMap::new(), b"hello world").unwrap();
    let upper = checksum::gen(&[b"hello world"]).to_uppercase();
    assert!(cache.get(&url, Destination::Script, Some(&upper)).unwrap().is_some());
  }

  #[test]
  fn test_miss_returns_none() {
    let dir = TempDir::new().unwrap();
    let cache = GlobalHttpCache::new(abs(&dir));
    let url = Url::parse("https://deno.land/x/nope.ts").unwrap();
    assert!(cache.get(&url, Destination::Script, None).unwrap().is_none());
  }

  #[test]
  fn test_script_json_distinct_entries() {
    let dir = TempDir::new().unwrap();
    let cache = GlobalHttpCache::new(abs(&dir));
    let url = Url::parse("https://deno.land/x/a.json").unwrap();
    cache.set(&url, Destination::Script, HeadersMap::new(), b"script bytes").unwrap();
    cache.set(&url, Destination::Json, HeadersMap::new(), b"json bytes").unwrap();
    let (_, script) = cache.get(&url, Destination::Script, None).unwrap().unwrap();
    let (_, json) = cache.get(&url, Destination::Json, None).unwrap().unwrap();
    assert_eq!(script, b"script bytes");
    assert_eq!(json, b"json bytes");
  }
}
