//! Drives one envelope call from payload to verified, decoded result.
//!
//! ```text
//! Building → Signing → Transporting → VerifyingResponse → DecodingResult → EvaluatingError
//! ```
//!
//! Every step either advances or returns a [`ProtocolError`]. Nothing is retried.
//! The decoded payload is delivered together with the evaluated [`CallStatus`],
//! because the counterparty attaches per-item results to failing batches.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::PayloadCodec;
use crate::envelope::{
    CallStatus, Credentials, Request, ResponseEnvelope, ResponseEnvelopeData, ResponseMeta,
};
use crate::error::{ProtocolError, Result};
use crate::keystore::KeyStore;
use crate::transport::Transport;

/// Account settings injected into every envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Partner account username.
    pub username: String,
    /// Partner account password, encrypted per call.
    pub password: String,
    /// Tenant service code.
    pub service_code: String,
}

impl ProcessorOptions {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        service_code: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            service_code: service_code.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(ProtocolError::Configuration("username is empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(ProtocolError::Configuration("password is empty".to_string()));
        }
        if self.service_code.is_empty() {
            return Err(ProtocolError::Configuration(
                "service code is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorOptions")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("service_code", &self.service_code)
            .finish()
    }
}

/// Decoded response together with its evaluated status.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<R> {
    /// Decoded payload; `None` when the response carried no `data`.
    pub result: Option<R>,
    /// Request-level and batch-level evaluation.
    pub status: CallStatus,
    /// Identifying fields of the response.
    pub meta: ResponseMeta,
}

impl<R> Outcome<R> {
    /// Converts a non-success status into an error, dropping any partial result.
    pub fn into_result(self) -> Result<R> {
        match self.status {
            CallStatus::Success => self
                .result
                .ok_or_else(|| ProtocolError::Codec("response carried no payload".to_string())),
            CallStatus::Rejected(err) => Err(ProtocolError::Request(err)),
            CallStatus::Batch(err) => Err(ProtocolError::Batch(err)),
        }
    }

    /// Splits the outcome into the (possibly partial) result and the status as an error.
    pub fn into_parts(self) -> (Option<R>, Result<()>) {
        let status = match self.status {
            CallStatus::Success => Ok(()),
            CallStatus::Rejected(err) => Err(ProtocolError::Request(err)),
            CallStatus::Batch(err) => Err(ProtocolError::Batch(err)),
        };
        (self.result, status)
    }
}

/// Builds, signs and sends envelopes, then verifies and unpacks the responses.
#[derive(Debug)]
pub struct EnvelopeProcessor<T> {
    keys: Arc<KeyStore>,
    transport: T,
    options: ProcessorOptions,
    codec: PayloadCodec,
}

impl<T: Transport> EnvelopeProcessor<T> {
    /// Creates a processor; empty credentials are rejected up front.
    pub fn new(keys: Arc<KeyStore>, transport: T, options: ProcessorOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            keys,
            transport,
            options,
            codec: PayloadCodec::new(),
        })
    }

    /// Replaces the payload codec.
    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Returns the shared key store.
    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Performs one call.
    ///
    /// Transport, signature and codec failures are returned as errors. Request and
    /// batch statuses are reported in [`Outcome::status`] next to the decoded result.
    pub async fn process<P, R>(&self, request: &Request<P>) -> Result<Outcome<R>>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let command = request.command().as_str();
        let order_id = request.envelope().order_id();

        // Building
        let encrypted_password = self.keys.encrypt_block(self.options.password.as_bytes())?;
        let data = self.codec.encode(request.payload())?;
        let envelope = request.envelope().build(
            Credentials {
                username: &self.options.username,
                encrypted_password: &encrypted_password,
                service_code: &self.options.service_code,
            },
            data,
        );
        tracing::debug!(command, order_id, payload_len = envelope.data.len(), "envelope built");

        // Signing
        let envelope_json = envelope.to_json()?;
        let signature = STANDARD.encode(self.keys.sign(envelope_json.as_bytes())?);

        // Transporting
        let response = self
            .transport
            .invoke(command, &envelope_json, &signature)
            .await
            .map_err(|e| {
                tracing::debug!(command, order_id, error = %e, "transport failed");
                ProtocolError::transport(e)
            })?;

        // VerifyingResponse
        let response = ResponseEnvelope::from_json(&response).inspect_err(|e| {
            tracing::debug!(command, order_id, error = %e, "malformed response");
        })?;
        if let Err(err) = self
            .keys
            .verify(response.signed_bytes(), &response.signature)
        {
            tracing::warn!(command, order_id, "response signature rejected");
            return Err(err);
        }

        // DecodingResult
        let response_data: ResponseEnvelopeData = serde_json::from_slice(response.signed_bytes())?;
        let result = if response_data.data.is_empty() {
            None
        } else {
            Some(self.codec.decode(&response_data.data)?)
        };

        // EvaluatingError
        let status = response_data.check_error();
        match &status {
            CallStatus::Success => {
                tracing::debug!(command, order_id, request_id = %response_data.request_id, "call succeeded")
            }
            CallStatus::Rejected(err) => {
                tracing::debug!(command, order_id, code = %err.code, "request rejected")
            }
            CallStatus::Batch(err) => {
                tracing::debug!(command, order_id, code = %err.code, "batch status reported")
            }
        }

        Ok(Outcome {
            result,
            status,
            meta: response_data.meta(),
        })
    }
}
