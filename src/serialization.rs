//! Versioned binary envelope for records held in the local tier.
//!
//! # Format
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes, little endian] [POSTCARD PAYLOAD]
//! ```
//!
//! Local entries are snapshots copied out on every hit, so each hit hands the
//! caller an independent value instead of a shared reference.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Envelope magic header.
pub const CACHE_MAGIC: [u8; 4] = *b"TIER";

/// Bump when a cached record layout changes incompatibly.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Encode `value` into an envelope.
///
/// # Errors
/// Returns `Error::SerializationError` if postcard cannot encode the value.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value)
        .map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode an envelope produced by [`serialize_for_cache`].
///
/// # Errors
/// - `Error::InvalidCacheEntry`: truncated envelope or bad magic
/// - `Error::VersionMismatch`: envelope written by another schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "envelope too short: {} bytes",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);

    if header[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry("bad magic header".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&header[4..]);
    let found = u32::from_le_bytes(version);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    Ok(postcard::from_bytes(payload)?)
}
