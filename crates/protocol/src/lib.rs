//! # ViettelPay Envelope Protocol
//!
//! Client-side engine for the ViettelPay partner API. Every call carries a
//! gzip-compressed JSON payload inside a signed envelope; every response is
//! signature-checked, decompressed and evaluated against a two-tier error model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Envelope Processor             │  build → sign → send → verify → decode
//! ├──────────────────┬──────────────────────┤
//! │     KeyStore     │    Payload Codec     │  RSA SHA-1 / reversed blocks │ gzip JSON
//! ├──────────────────┴──────────────────────┤
//! │            Envelope Model               │  request / response shapes
//! ├─────────────────────────────────────────┤
//! │          Transport (SOAP/HTTP)          │  supplied by the caller
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use protocol::{Command, EnvelopeBuilder, EnvelopeProcessor, KeyStore, ProcessorOptions, Request, Transport};
//!
//! # async fn run<T: Transport>(transport: T, private_pem: &str, public_pem: &str) -> protocol::Result<()> {
//! let keys = Arc::new(KeyStore::from_pem(private_pem, public_pem)?);
//! let processor = EnvelopeProcessor::new(
//!     keys,
//!     transport,
//!     ProcessorOptions::new("partner", "password", "SERVICE"),
//! )?;
//!
//! let request = Request::new(
//!     Command::QUERY_REQUESTS,
//!     Vec::<u8>::new(),
//!     EnvelopeBuilder::query("01FBRYWSNEWB265WEHHEHCDRH4", None),
//! );
//! let outcome = processor.process::<_, serde_json::Value>(&request).await?;
//! println!("{:?}", outcome.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`keystore`]: RSA signing, verification and the vendor block cipher
//! - [`codec`]: gzip JSON payload codec
//! - [`envelope`]: request/response envelopes, commands, batch status codes
//! - [`processor`]: the call pipeline
//! - [`transport`]: the remote call abstraction
//! - [`error`]: Error types

pub mod codec;
pub mod envelope;
pub mod error;
pub mod keystore;
pub mod processor;
pub mod transport;

pub use codec::{PayloadCodec, GZIP_MAGIC, MAX_PAYLOAD_SIZE};
pub use envelope::{
    BatchStatusCode, CallStatus, Command, Credentials, EnvelopeBuilder, EnvelopeExtension,
    QuerySelector, Request, RequestEnvelope, ResponseEnvelope, ResponseEnvelopeData,
    ResponseMeta, SUCCESS_CODE,
};
pub use error::{BatchError, BoxError, ProtocolError, RequestError, Result};
pub use keystore::{KeyPairPem, KeyStore, BLOCK_OVERHEAD, DEFAULT_KEY_BITS};
pub use processor::{EnvelopeProcessor, Outcome, ProcessorOptions};
pub use transport::Transport;
