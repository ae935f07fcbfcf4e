// Copyright 2018-2026 the project authors. MIT license.
//! URL -> relative cache path encoding (PathEncoder, spec 4.1).
//!
//! Grounded in the teacher's `cli/cache/http_cache/{common,global}.rs`:
//! the hashed-hostdir layout for http(s)/data/blob is taken almost
//! verbatim from `url_to_filename`/`base_url_to_filename_parts`, then
//! generalized to fold in `Destination` and to cover `wasm:`/`file:`.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Disambiguates cache entries for a URL whose bytes are interpreted
/// differently depending on what's loading them (spec 3, Destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Script,
  Json,
}

impl Destination {
  /// Folded into the hash input for non-default destinations. `Script`
  /// contributes nothing so that existing `Script` entries keep the
  /// plain `sha256(path[+query])` hash the teacher's cache already uses.
  fn hash_suffix(self) -> &'static str {
    match self {
      Destination::Script => "",
      Destination::Json => "\u{0}json",
    }
  }

  /// Stable small integer used when a destination must be serialized,
  /// e.g. alongside a metadata sidecar.
  pub fn as_tag(self) -> u8 {
    match self {
      Destination::Script => 0,
      Destination::Json => 1,
    }
  }
}

#[derive(Debug, Error)]
#[error("can't convert url (\"{url}\") to a cache path")]
pub struct UnsupportedUrlError {
  pub url: String,
}

fn err(url: &Url) -> UnsupportedUrlError {
  UnsupportedUrlError { url: url.to_string() }
}

/// Turn the base of a url (scheme, hostname, port) into cache path
/// parts. Replaces the port separator with a token because `:` is not
/// valid in a path segment on every platform.
pub fn base_url_to_filename_parts(
  url: &Url,
  port_separator: &str,
) -> Option<Vec<String>> {
  let mut out = Vec::with_capacity(2);
  let scheme = url.scheme();
  out.push(scheme.to_string());

  match scheme {
    "http" | "https" | "wasm" => {
      let host = url.host_str()?;
      let host_port = match url.port() {
        Some(port) => format!("{host}{port_separator}{port}"),
        None => host.to_string(),
      };
      out.push(host_port);
    }
    "data" | "blob" => (),
    scheme => {
      log::debug!("don't know how to build a cache path for scheme: {scheme}");
      return None;
    }
  }

  Some(out)
}

/// Hashed filename used by the global cache for `http`/`https`/`data`/
/// `blob` urls (spec 4.1, first bullet). The fragment is always
/// ignored; the destination is folded into the hash for non-default
/// destinations.
pub fn url_to_filename(
  url: &Url,
  destination: Destination,
) -> Result<PathBuf, UnsupportedUrlError> {
  if url.scheme() == "wasm" {
    // wasm: is encoded verbatim by `url_to_wasm_path`, never hashed
    // into the global cache's layout (spec 4.1: "encoded to a path but
    // not managed by the HTTP cache").
    return Err(err(url));
  }
  let Some(parts) = base_url_to_filename_parts(url, "_PORT") else {
    return Err(err(url));
  };
  let mut cache_filename: PathBuf = parts.into_iter().collect();

  let mut rest_str = url.path().to_string();
  if let Some(query) = url.query() {
    rest_str.push('?');
    rest_str.push_str(query);
  }
  rest_str.push_str(destination.hash_suffix());

  let hashed = crate::checksum::gen(&[rest_str.as_bytes()]);
  cache_filename.push(hashed);
  Ok(cache_filename)
}

/// `wasm://` path encoding: `wasm/<host-or-hostport>/<path components>`,
/// path components appended verbatim with no hashing.
pub fn url_to_wasm_path(url: &Url) -> Result<PathBuf, UnsupportedUrlError> {
  if url.scheme() != "wasm" {
    return Err(err(url));
  }
  let Some(base_parts) = base_url_to_filename_parts(url, "_PORT") else {
    return Err(err(url));
  };
  let Some(segments) = url.path_segments() else {
    return Err(err(url));
  };
  let mut path: PathBuf = base_parts.into_iter().collect();
  for seg in segments {
    path.push(decode_segment(seg));
  }
  Ok(path)
}

fn decode_segment(segment: &str) -> String {
  percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Decodes a `file:` url to the relative cache path it would occupy
/// under a `file/` scheme directory (spec 4.1, third bullet). This is
/// used for display/debugging only: the Fetcher reads `file:` urls
/// straight off disk and never routes them through a cache backend.
pub fn url_to_file_path(url: &Url) -> Result<PathBuf, UnsupportedUrlError> {
  if url.scheme() != "file" {
    return Err(err(url));
  }
  let mut parts = vec!["file".to_string()];
  let segments: Vec<&str> = url.path_segments().ok_or_else(|| err(url))?.collect();

  match url.host_str() {
    Some(host) if !host.is_empty() && host != "localhost" => {
      // UNC host: file://server/share/sub -> file/UNC/server/share/sub
      parts.push("UNC".to_string());
      parts.push(host.replace(':', "_"));
      for seg in segments {
        parts.push(decode_segment(seg));
      }
    }
    _ => {
      let mut iter = segments.into_iter();
      if cfg!(windows) {
        // First segment is the drive letter, e.g. "C:" -> "C".
        if let Some(first) = iter.next() {
          let decoded = decode_segment(first);
          parts.push(decoded.trim_end_matches(':').to_string());
        }
      }
      for seg in iter {
        parts.push(decode_segment(seg));
      }
    }
  }

  Ok(parts.into_iter().collect())
}
