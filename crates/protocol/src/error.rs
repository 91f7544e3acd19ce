//! Error types for the protocol crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error returned by a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Protocol error type covering all possible failure modes of an envelope call.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Missing or invalid key material, credentials or options.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    // Payload errors
    /// Compression, decompression or structured-data parse failure.
    #[error("codec failure: {0}")]
    Codec(String),

    /// Decompressed payload exceeds the allowed size.
    #[error("payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Number of bytes produced before giving up.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    // Cryptographic errors
    /// Signing the request envelope failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The response signature did not verify against the counterparty key.
    #[error("response signature verification failed")]
    Verification,

    /// Block encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Block decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The transport collaborator failed; surfaced as-is.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    // Protocol-level signals
    /// The counterparty rejected the whole request.
    #[error(transparent)]
    Request(RequestError),

    /// The counterparty reported a batch-level status.
    #[error(transparent)]
    Batch(BatchError),
}

impl ProtocolError {
    /// Wraps a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ProtocolError::Transport(err.into())
    }

    /// Returns true for the business-level signals carried inside a verified response.
    pub fn is_protocol_signal(&self) -> bool {
        matches!(self, ProtocolError::Request(_) | ProtocolError::Batch(_))
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Request-level rejection (`errorCode != "00"`).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("request rejected ({code}): {desc}")]
pub struct RequestError {
    /// Raw `errorCode` from the response.
    #[serde(rename = "errorCode")]
    pub code: String,
    /// Raw `errorDesc` from the response.
    #[serde(rename = "errorDesc")]
    pub desc: String,
}

/// Batch-level status (`batchErrorCode` present and non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("batch status ({code}): {desc}")]
pub struct BatchError {
    /// Raw `batchErrorCode` from the response.
    #[serde(rename = "batchErrorCode")]
    pub code: String,
    /// Raw `batchErrorDesc` from the response.
    #[serde(rename = "batchErrorDesc")]
    pub desc: String,
}

impl BatchError {
    /// Maps the raw code onto the known disbursement lifecycle states.
    pub fn status(&self) -> crate::envelope::BatchStatusCode {
        crate::envelope::BatchStatusCode::from_code(&self.code)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Codec(err.to_string())
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::Codec(format!("invalid base64: {}", err))
    }
}
