//! Encoding of entity cache entries, including the negative sentinel.

use keystone_core::CacheError;
use serde::{de::DeserializeOwned, Serialize};

/// Marker stored in place of a value when the durable store has no record.
///
/// Positive entries are JSON objects and always start with `{`, so the
/// marker cannot be mistaken for a serialized record.
pub const NOT_FOUND_SENTINEL: &[u8] = b"not_found";

/// Decoded content of an entity cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue<T> {
    /// The record, as last read from the durable store.
    Present(T),
    /// The durable store had no record for this id.
    Absent,
}

impl<T> CachedValue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Serialize for storage.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        match self {
            CachedValue::Present(value) => {
                serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                })
            }
            CachedValue::Absent => Ok(NOT_FOUND_SENTINEL.to_vec()),
        }
    }

    /// Deserialize bytes read from the cache.
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes == NOT_FOUND_SENTINEL {
            return Ok(CachedValue::Absent);
        }
        serde_json::from_slice(bytes)
            .map(CachedValue::Present)
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })
    }

    /// Convert into an `Option`, mapping the sentinel to `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            CachedValue::Present(value) => Some(value),
            CachedValue::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CachedValue::Absent)
    }
}
