// Copyright 2018-2026 the project authors. MIT license.
//! Shared cache trait and key type, grounded in the teacher's
//! `cli/cache/http_cache/mod.rs`.

use std::path::PathBuf;
use std::time::SystemTime;

use url::Url;

use crate::error::CacheError;
use crate::metadata::CachedUrlMetadata;
use crate::metadata::HeadersMap;
use crate::path::Destination;

/// Default permission bits for cache content files (spec 4.2).
pub use crate::atomic_fs::CACHE_PERM;

/// A pre-computed lookup key, produced once by [`HttpCache::cache_item_key`]
/// and reused across `read_file_bytes`/`read_metadata`/`read_modified_time`
/// so callers don't recompute the hashed path repeatedly.
pub struct HttpCacheItemKey<'a> {
  #[cfg(debug_assertions)]
  pub(crate) is_local_key: bool,
  pub(crate) url: &'a Url,
  pub(crate) destination: Destination,
  /// Always set for the global cache. Unset for the local cache until
  /// header information (needed to pick the decoded sub path) is known.
  pub(crate) file_path: Option<PathBuf>,
}

/// The on-disk backend shared by [`crate::global_cache::GlobalHttpCache`]
/// and [`crate::local_cache::LocalHttpCache`].
pub trait HttpCache: Send + Sync + std::fmt::Debug {
  fn cache_item_key<'a>(
    &self,
    url: &'a Url,
    destination: Destination,
  ) -> Result<HttpCacheItemKey<'a>, CacheError>;

  fn contains(&self, url: &Url, destination: Destination) -> bool;

  /// Whether a cache hit's checksum should be verified against
  /// `opts.checksum` (spec 4.5: ignored for local/vendor hits, since
  /// vendored bytes are already considered trusted; the global cache
  /// always verifies).
  fn verifies_checksum(&self) -> bool {
    true
  }

  fn set(
    &self,
    url: &Url,
    destination: Destination,
    headers: HeadersMap,
    content: &[u8],
  ) -> Result<(), CacheError>;

  fn read_modified_time(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<SystemTime>, CacheError>;

  fn read_file_bytes(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<Vec<u8>>, CacheError>;

  fn read_metadata(
    &self,
    key: &HttpCacheItemKey,
  ) -> Result<Option<CachedUrlMetadata>, CacheError>;
}
