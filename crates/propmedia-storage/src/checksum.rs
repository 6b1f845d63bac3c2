//! Checksum normalisation for signed uploads.
//!
//! Clients may send a SHA-256 as hex, as base64, or prefixed with the
//! algorithm (`sha256:...`). The object store speaks base64 only.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Base64 form of `value`, or `None` when it is neither hex nor base64.
pub fn normalize_checksum(value: &str) -> Option<String> {
    let mut trimmed = value.trim();
    if let Some((_, rest)) = trimmed.split_once(':') {
        trimmed = rest.trim();
    }
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() % 2 == 0 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(trimmed).ok().map(|raw| STANDARD.encode(raw));
    }

    if STANDARD.decode(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    None
}

/// SHA-256 of `data`, base64-encoded the way S3 reports `ChecksumSHA256`.
pub fn sha256_base64(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}
