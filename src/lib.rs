// Copyright 2018-2026 the project authors. MIT license.
//! A local, content-addressed HTTP cache mirroring a source-distribution
//! toolchain's on-disk module cache: deterministic paths derived from
//! request URLs, atomic writes, transparent redirect following,
//! checksum verification, and a global store overlaid by a per-project
//! vendor store.
//!
//! Two cache backends implement the shared [`cache::HttpCache`] trait:
//! [`global_cache::GlobalHttpCache`] (canonical, hash-keyed) and
//! [`local_cache::LocalHttpCache`] (human-readable, copy-on-read
//! overlay). [`cache_root::CacheRoot`] resolves where the global store
//! lives on disk. The `fetcher` module (behind the `fetcher` feature)
//! adds the network orchestration on top: retries, redirect chasing,
//! conditional revalidation, and the [`fetcher::loader::Loader`] façade
//! consumers actually call.

pub mod atomic_fs;
pub mod cache;
pub mod cache_root;
pub mod checksum;
pub mod error;
pub mod global_cache;
pub mod local_cache;
pub mod metadata;
pub mod path;

#[cfg(feature = "fetcher")]
pub mod auth_tokens;
#[cfg(feature = "fetcher")]
pub mod fetcher;

pub use cache::HttpCache;
pub use cache::HttpCacheItemKey;
pub use cache_root::CacheRoot;
pub use error::CacheError;
pub use error::ModCacheError;
pub use global_cache::GlobalHttpCache;
pub use local_cache::LocalHttpCache;
pub use path::Destination;

#[cfg(feature = "fetcher")]
pub use auth_tokens::AuthTokens;
#[cfg(feature = "fetcher")]
pub use fetcher::http_client::HttpClient;
#[cfg(feature = "fetcher")]
pub use fetcher::http_client::ReqwestHttpClient;
#[cfg(feature = "fetcher")]
pub use fetcher::loader::Loader;
#[cfg(feature = "fetcher")]
pub use fetcher::CacheSetting;
#[cfg(feature = "fetcher")]
pub use fetcher::FetchOptions;
#[cfg(feature = "fetcher")]
pub use fetcher::Fetcher;
#[cfg(feature = "fetcher")]
pub use fetcher::LoadResponse;
