//! Value Codec Module
//!
//! Turns cached values into the opaque bytes stored in value files.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encodes values to bytes and back.
///
/// The cache stores whatever bytes `encode` produced and hands the same
/// bytes to `decode` on read.
pub trait Codec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
