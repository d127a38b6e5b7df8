//! Format-specific encoding and decoding (feature-gated).
//!
//! The store's persisted snapshot is an opaque blob produced by a generic
//! structured-value serializer; [`encode`] and [`decode`] convert between
//! serde-serializable types and byte buffers in the chosen format.

use crate::error::{SerializationError, SerializationResult};

/// Supported persistence formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// RON (Rusty Object Notation) — human-readable text format.
    #[cfg(feature = "serialize-ron")]
    Ron,
    /// Bincode — compact binary format.
    #[cfg(feature = "serialize-bincode")]
    Bincode,
}

/// Encode a serde-serializable value to bytes in the given format.
#[allow(unused_variables)]
pub fn encode<T: serde::Serialize>(value: &T, format: Format) -> SerializationResult<Vec<u8>> {
    match format {
        #[cfg(feature = "serialize-ron")]
        Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map(|s| s.into_bytes())
            .map_err(|e| SerializationError::Format(e.to_string())),
        #[cfg(feature = "serialize-bincode")]
        Format::Bincode => {
            bincode::serialize(value).map_err(|e| SerializationError::Format(e.to_string()))
        }
    }
}

/// Decode bytes in the given format to a serde-deserializable type.
#[allow(unused_variables)]
pub fn decode<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    format: Format,
) -> SerializationResult<T> {
    match format {
        #[cfg(feature = "serialize-ron")]
        Format::Ron => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| SerializationError::Format(e.to_string()))?;
            ron::from_str(s).map_err(|e| SerializationError::Format(e.to_string()))
        }
        #[cfg(feature = "serialize-bincode")]
        Format::Bincode => {
            bincode::deserialize(bytes).map_err(|e| SerializationError::Format(e.to_string()))
        }
    }
}
