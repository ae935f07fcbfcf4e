// Copyright 2018-2026 the project authors. MIT license.
//! The façade a module resolver actually calls (Loader, spec 6).
//!
//! Grounded in the teacher's `cli/cache/mod.rs::FetchCacher::load`: a
//! thin `async fn load` that drives the Fetcher and folds `NotFound`
//! into an absent result so callers don't need to match on every
//! error variant just to notice a 404.

use url::Url;

use crate::error::ModCacheError;

use super::CacheSetting;
use super::FetchOptions;
use super::Fetcher;
use super::LoadResponse;

/// Wraps a [`Fetcher`] with the simpler two-outcome surface (a
/// response, or nothing) that module resolution wants, swallowing
/// `NotFound` the way a resolver expects a missing module to look like
/// `None` rather than a thrown error.
#[derive(Debug)]
pub struct Loader {
  fetcher: Fetcher,
}

impl Loader {
  pub fn new(fetcher: Fetcher) -> Self {
    Self { fetcher }
  }

  pub async fn load(
    &self,
    specifier: &Url,
    is_dynamic: bool,
    cache_setting: Option<CacheSetting>,
    checksum: Option<String>,
  ) -> Result<Option<LoadResponse>, ModCacheError> {
    let opts = FetchOptions { is_dynamic, cache_setting, checksum };
    match self.fetcher.fetch(specifier, opts).await {
      Ok(response) => Ok(response),
      Err(ModCacheError::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }
}
