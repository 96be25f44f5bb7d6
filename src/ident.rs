//! Canonical identity hashing.
//!
//! Symbol ids are the first 64 bits of a SHA-256 over the identity tuple,
//! rendered as 16 hex chars. Content hashes use the same truncation; the
//! Merkle tree uses the full digest.

use crate::types::{EdgeKind, EdgeOrigin};
use sha2::{Digest, Sha256};

/// Full SHA-256 hex digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest)
}

/// First 8 bytes of a SHA-256, as 16 lowercase hex chars.
pub fn hash16(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest[..8])
}

/// Stable symbol id: `hash16(qualified_name ∥ signature ∥ language)`.
///
/// The NUL separator keeps `("ab", "c")` and `("a", "bc")` distinct.
pub fn symbol_id(qualified_name: &str, signature: Option<&str>, language: &str) -> String {
    let mut input = Vec::with_capacity(qualified_name.len() + language.len() + 8);
    input.extend_from_slice(qualified_name.as_bytes());
    input.push(0);
    if let Some(sig) = signature {
        input.extend_from_slice(sig.as_bytes());
    }
    input.push(0);
    input.extend_from_slice(language.as_bytes());
    hash16(&input)
}

/// Content hash of a symbol body or file.
pub fn content_hash(content: &str) -> String {
    hash16(content.as_bytes())
}

/// Deterministic id for an edge, so re-extraction upserts the same row.
pub fn edge_id(source_id: &str, target_id: &str, kind: EdgeKind, origin: EdgeOrigin) -> String {
    let input = format!(
        "{source_id}\0{target_id}\0{kind}\0{origin}",
        kind = kind.as_str(),
        origin = origin.as_str()
    );
    hash16(input.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
