//! Compact JSON codec for topic payloads.
//!
//! `serde_json` emits compact output and leaves non-ASCII text unescaped,
//! which is exactly the wire contract: patient names and template bodies
//! pass through byte-for-byte.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("JSON decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize a topic value to compact JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

/// Deserialize a topic value from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
