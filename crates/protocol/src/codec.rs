//! Payload codec: JSON serialization wrapped in gzip.
//!
//! # Payload format
//!
//! The `data` field of every envelope carries a gzip stream whose content is a
//! single JSON document followed by a newline, the same bytes a streaming JSON
//! encoder writes. There is no length prefix.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Maximum decompressed payload size (16 MB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Magic bytes opening every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encoder and decoder for envelope payloads.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    level: Compression,
    max_size: usize,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadCodec {
    /// Create a codec using the default gzip level.
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
            max_size: MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a codec with an explicit gzip level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            max_size: MAX_PAYLOAD_SIZE,
        }
    }

    /// Limit the decompressed size accepted by [`PayloadCodec::decode`].
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    /// Serialize `value` to JSON and gzip it.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let mut json = serde_json::to_vec(value)?;
        json.push(b'\n');

        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(&json)
            .map_err(|e| ProtocolError::Codec(format!("failed to compress payload: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| ProtocolError::Codec(format!("failed to compress payload: {}", e)))
    }

    /// Gunzip `data` and deserialize the JSON document into `T`.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if data.len() < GZIP_MAGIC.len() || data[..2] != GZIP_MAGIC {
            return Err(ProtocolError::Codec(
                "payload is not a gzip stream".to_string(),
            ));
        }

        let mut json = Vec::new();
        GzDecoder::new(data)
            .take(self.max_size as u64 + 1)
            .read_to_end(&mut json)
            .map_err(|e| ProtocolError::Codec(format!("failed to decompress payload: {}", e)))?;

        if json.len() > self.max_size {
            return Err(ProtocolError::PayloadTooLarge {
                size: json.len(),
                max: self.max_size,
            });
        }

        serde_json::from_slice(&json).map_err(|e| {
            ProtocolError::Codec(format!("payload does not match expected shape: {}", e))
        })
    }
}
