// Copyright 2018-2026 the project authors. MIT license.
//! `DENO_AUTH_TOKENS`-style credential parsing (AuthTokens, spec 4.6).
//!
//! Grounded in the teacher's `cli/auth_tokens.rs`, which only covers
//! Bearer tokens; extended here with Basic auth (`user:pass@host`) per
//! the expanded spec.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthTokenKind {
  Bearer(String),
  Basic { user: String, pass: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
  host: String,
  kind: AuthTokenKind,
}

impl fmt::Display for AuthToken {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.kind {
      AuthTokenKind::Bearer(token) => write!(f, "Bearer {token}"),
      AuthTokenKind::Basic { user, pass } => {
        let encoded = STANDARD.encode(format!("{user}:{pass}"));
        write!(f, "Basic {encoded}")
      }
    }
  }
}

/// Credentials parsed from `DENO_AUTH_TOKENS`, used to authorize
/// requests to private remote modules.
#[derive(Debug, Clone, Default)]
pub struct AuthTokens(Vec<AuthToken>);

impl AuthTokens {
  /// Parses a `;`-separated `DENO_AUTH_TOKENS` value. Each element is
  /// either `token@host` (Bearer) or `user:pass@host` (Basic).
  /// Splitting uses the last `@`, then the last `:` within the
  /// user-info portion, so secrets may themselves contain `@`/`:`.
  pub fn new(maybe_tokens_str: Option<String>) -> Self {
    let mut tokens = Vec::new();
    if let Some(tokens_str) = maybe_tokens_str {
      for token_str in tokens_str.split(';') {
        if token_str.is_empty() {
          continue;
        }
        let Some((userinfo, host)) = token_str.rsplit_once('@') else {
          log::warn!("badly formed auth token discarded: no '@' separator");
          continue;
        };
        let host = host.to_lowercase();
        let kind = match userinfo.rsplit_once(':') {
          Some((user, pass)) => {
            AuthTokenKind::Basic { user: user.to_string(), pass: pass.to_string() }
          }
          None => AuthTokenKind::Bearer(userinfo.to_string()),
        };
        tokens.push(AuthToken { host, kind });
      }
      log::debug!("parsed {} auth token(s)", tokens.len());
    }
    Self(tokens)
  }

  /// Matches `url`'s host (plus port, if any) against each token's
  /// host as a suffix (case-insensitive, scheme-agnostic). Per spec
  /// Open Question (c), this intentionally has no `.`-boundary check:
  /// a token for `example.com` matches `evilexample.com` too. Changing
  /// that would be a compatibility break, not a bug fix.
  pub fn get(&self, url: &Url) -> Option<AuthToken> {
    self.0.iter().find_map(|t| {
      let hostname = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str()?),
        None => url.host_str()?.to_string(),
      };
      if hostname.to_lowercase().ends_with(&t.host) {
        Some(t.clone())
      } else {
        None
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bearer_token() {
    let auth_tokens = AuthTokens::new(Some("abc123@deno.land".to_string()));
    let url = Url::parse("https://deno.land/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer abc123");

    let url = Url::parse("https://www.deno.land/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer abc123");

    let url = Url::parse("http://127.0.0.1:8080/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url), None);
  }

  #[test]
  fn test_basic_auth() {
    let auth_tokens = AuthTokens::new(Some("user1:pw1@example.com".to_string()));
    let url = Url::parse("https://example.com/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Basic dXNlcjE6cHcx");
  }

  #[test]
  fn test_multiple_tokens() {
    let auth_tokens =
      AuthTokens::new(Some("abc123@deno.land;def456@example.com".to_string()));
    let url = Url::parse("https://deno.land/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer abc123");
    let url = Url::parse("http://example.com/a/file.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer def456");
  }

  #[test]
  fn test_port_must_match() {
    let auth_tokens = AuthTokens::new(Some("abc123@deno.land:8080".to_string()));
    let url = Url::parse("https://deno.land/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url), None);
    let url = Url::parse("http://deno.land:8080/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer abc123");
  }

  #[test]
  fn test_token_contains_at() {
    let auth_tokens = AuthTokens::new(Some("abc@123@deno.land".to_string()));
    let url = Url::parse("https://deno.land/x/mod.ts").unwrap();
    assert_eq!(auth_tokens.get(&url).unwrap().to_string(), "Bearer abc@123");
  }

  #[test]
  fn test_lenient_host_suffix_match() {
    // Open Question (c): preserved on purpose, see `get`'s doc comment.
    let auth_tokens = AuthTokens::new(Some("t@example.com".to_string()));
    let url = Url::parse("https://evilexample.com/x").unwrap();
    assert!(auth_tokens.get(&url).is_some());
  }

  #[test]
  fn test_malformed_entry_discarded() {
    let auth_tokens = AuthTokens::new(Some("no-at-sign".to_string()));
    let url = Url::parse("https://deno.land/x").unwrap();
    assert_eq!(auth_tokens.get(&url), None);
  }
}
