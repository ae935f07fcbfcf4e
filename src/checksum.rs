// Copyright 2018-2026 the project authors. MIT license.
//! SHA-256 hashing helper, grounded in the teacher's
//! `cli/lib/util/checksum.rs`. Swaps `aws_lc_rs` for the plain `sha2`
//! crate since nothing else in this crate needs a crypto provider.

use faster_hex::hex_string;
use sha2::Digest;
use sha2::Sha256;

/// Hashes the concatenation of `bytes` and returns lowercase hex.
pub fn gen(bytes: &[&[u8]]) -> String {
  let mut hasher = Sha256::new();
  for slice in bytes {
    hasher.update(slice);
  }
  hex_string(&hasher.finalize())
}

/// Case-insensitive hex comparison, used to verify an expected checksum
/// against a freshly computed one (spec 4.7, checksum verification).
pub fn matches(expected_hex: &str, actual_hex: &str) -> bool {
  expected_hex.eq_ignore_ascii_case(actual_hex)
}
