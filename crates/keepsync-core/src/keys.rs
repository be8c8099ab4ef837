//! Content-addressed key derivation
//!
//! Keys are lowercase hex SHA-256 digests. JSON inputs are hashed in their
//! canonical form (object members sorted by name, no insignificant
//! whitespace), so two structurally equal values always map to the same key
//! regardless of how they were built.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{DomainError, OwnerId, RecordKey};

/// Hex SHA-256 of raw bytes
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Derives a stable record key from any serializable input
///
/// # Errors
/// Returns `ValidationFailed` if the input cannot be represented as JSON
pub fn content_key<T: Serialize + ?Sized>(input: &T) -> Result<RecordKey, DomainError> {
    // Going through `Value` sorts object members.
    let value = serde_json::to_value(input)
        .map_err(|e| DomainError::ValidationFailed(format!("unhashable input: {e}")))?;
    let canonical = serde_json::to_vec(&value)
        .map_err(|e| DomainError::ValidationFailed(format!("unhashable input: {e}")))?;
    Ok(RecordKey::from_digest(digest_hex(&canonical)))
}

/// Derives a key from an ordered list of string parts
///
/// Parts are length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn composite_key(parts: &[&str]) -> RecordKey {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    RecordKey::from_digest(format!("{:x}", hasher.finalize()))
}

/// Opaque, path-safe identity for an owner
///
/// Used in remote object paths so raw owner ids never leave the device.
pub fn owner_opaque_id(owner: &OwnerId) -> String {
    digest_hex(owner.as_str().as_bytes())
}
