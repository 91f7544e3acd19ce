//! Envelope definitions for the partner API.
//!
//! A request envelope carries the account credentials, the caller's order id and the
//! compressed payload, followed by fields specific to the command. The serialized
//! envelope is what gets signed, so field order and casing are fixed:
//!
//! ```text
//! username, password, serviceCode, orderId, data, <extension fields>
//! ```
//!
//! A response arrives as `{"data": <json>, "signature": <base64>}` where the inner
//! `data` document is verified byte-for-byte before being parsed into
//! [`ResponseEnvelopeData`].

use std::borrow::Cow;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{BatchError, RequestError};

/// `errorCode` value reported for an accepted request.
pub const SUCCESS_CODE: &str = "00";

/// Command code sent as `cmd` with every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(Cow<'static, str>);

impl Command {
    /// Check that subscriber accounts exist and match the given name.
    pub const CHECK_ACCOUNT: Command = Command(Cow::Borrowed("VTP305"));
    /// Submit a disbursement batch.
    pub const REQUEST_DISBURSEMENT: Command = Command(Cow::Borrowed("VTP306"));
    /// Query the outcome of a disbursement batch.
    pub const QUERY_REQUESTS: Command = Command(Cow::Borrowed("VTP307"));

    /// Creates a command for a code not known to this crate.
    pub fn new(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    /// Returns the raw command code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a batch-status query selects transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySelector {
    /// A single transaction by its partner-side id.
    TransactionId(String),
    /// Every transaction of one subscriber.
    Msisdn(String),
}

impl QuerySelector {
    /// Returns the `(queryType, queryValue)` pair placed in the envelope.
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            QuerySelector::TransactionId(id) => ("transId", id),
            QuerySelector::Msisdn(msisdn) => ("msisdn", msisdn),
        }
    }
}

/// Command-specific envelope fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvelopeExtension {
    /// Only the universal fields.
    #[default]
    None,
    /// Batch summary for a disbursement request.
    Disbursement {
        /// Number of line items.
        total_trans: usize,
        /// Sum of all item amounts.
        total_amount: u64,
        /// Free-text description of the batch.
        trans_content: String,
    },
    /// Batch-status query; no selector means list everything for the order.
    Query(Option<QuerySelector>),
}

/// Universal fields injected by the processor into every envelope.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    /// Account username.
    pub username: &'a str,
    /// Password already encrypted with the counterparty key.
    pub encrypted_password: &'a str,
    /// Tenant service code.
    pub service_code: &'a str,
}

/// Per-command recipe for a request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeBuilder {
    order_id: String,
    extension: EnvelopeExtension,
}

impl EnvelopeBuilder {
    /// Envelope carrying only the universal fields.
    pub fn plain(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            extension: EnvelopeExtension::None,
        }
    }

    /// Disbursement envelope; count and total are derived from `amounts`.
    pub fn disbursement<I>(order_id: impl Into<String>, content: impl Into<String>, amounts: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let (total_trans, total_amount) = amounts
            .into_iter()
            .fold((0usize, 0u64), |(count, sum), amount| {
                (count + 1, sum.saturating_add(amount))
            });

        Self {
            order_id: order_id.into(),
            extension: EnvelopeExtension::Disbursement {
                total_trans,
                total_amount,
                trans_content: content.into(),
            },
        }
    }

    /// Query envelope for a previously submitted order.
    pub fn query(order_id: impl Into<String>, selector: Option<QuerySelector>) -> Self {
        Self {
            order_id: order_id.into(),
            extension: EnvelopeExtension::Query(selector),
        }
    }

    /// Returns the caller-chosen order id.
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Returns the command-specific fields.
    pub fn extension(&self) -> &EnvelopeExtension {
        &self.extension
    }

    /// Merges the universal fields, the compressed payload and the extension.
    pub fn build(&self, credentials: Credentials<'_>, data: Vec<u8>) -> RequestEnvelope {
        RequestEnvelope {
            username: credentials.username.to_string(),
            password: credentials.encrypted_password.to_string(),
            service_code: credentials.service_code.to_string(),
            order_id: self.order_id.clone(),
            data,
            extension: self.extension.clone(),
        }
    }
}

/// Outgoing envelope; serializes in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub username: String,
    pub password: String,
    pub service_code: String,
    pub order_id: String,
    /// Compressed payload, base64 in JSON.
    pub data: Vec<u8>,
    pub extension: EnvelopeExtension,
}

impl RequestEnvelope {
    /// Serializes the envelope to the JSON bytes that get signed and sent.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for RequestEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("username", &self.username)?;
        map.serialize_entry("password", &self.password)?;
        map.serialize_entry("serviceCode", &self.service_code)?;
        map.serialize_entry("orderId", &self.order_id)?;
        map.serialize_entry("data", &base64_bytes::Encoded(&self.data))?;

        match &self.extension {
            EnvelopeExtension::None => {}
            EnvelopeExtension::Disbursement {
                total_trans,
                total_amount,
                trans_content,
            } => {
                map.serialize_entry("totalTrans", total_trans)?;
                map.serialize_entry("totalAmount", total_amount)?;
                map.serialize_entry("transContent", trans_content)?;
            }
            EnvelopeExtension::Query(Some(selector)) => {
                let (query_type, query_value) = selector.query_pair();
                map.serialize_entry("queryType", query_type)?;
                map.serialize_entry("queryValue", query_value)?;
            }
            EnvelopeExtension::Query(None) => {}
        }

        map.end()
    }
}

/// Outer response shape returned by the transport.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    /// Signed JSON document, kept exactly as received.
    pub data: Box<RawValue>,
    /// SHA-1 / PKCS#1 v1.5 signature over `data`.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl ResponseEnvelope {
    /// Parses the raw response text.
    ///
    /// A body that is not a `{data, signature}` document is a failed exchange, so
    /// it is reported as [`ProtocolError::Transport`](crate::ProtocolError::Transport).
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(crate::ProtocolError::transport)
    }

    /// The exact bytes covered by the signature.
    pub fn signed_bytes(&self) -> &[u8] {
        self.data.get().as_bytes()
    }
}

/// Verified response document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseEnvelopeData {
    pub order_id: String,
    /// Compressed result payload; may carry partial results alongside an error.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub username: String,
    pub service_code: String,
    pub real_service_code: String,
    pub request_id: String,
    pub trans_date: String,
    pub error_code: String,
    pub error_desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_error_desc: Option<String>,
}

impl ResponseEnvelopeData {
    /// Applies the error precedence: request-level first, then batch-level.
    pub fn check_error(&self) -> CallStatus {
        if self.error_code != SUCCESS_CODE {
            return CallStatus::Rejected(RequestError {
                code: self.error_code.clone(),
                desc: self.error_desc.clone(),
            });
        }

        match self.batch_error_code.as_deref() {
            Some(code) if !code.is_empty() => CallStatus::Batch(BatchError {
                code: code.to_string(),
                desc: self.batch_error_desc.clone().unwrap_or_default(),
            }),
            _ => CallStatus::Success,
        }
    }

    /// Metadata describing the response, without the payload.
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            order_id: self.order_id.clone(),
            request_id: self.request_id.clone(),
            trans_date: self.trans_date.clone(),
            service_code: self.service_code.clone(),
            real_service_code: self.real_service_code.clone(),
        }
    }
}

/// Identifying fields of a verified response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub order_id: String,
    pub request_id: String,
    pub trans_date: String,
    pub service_code: String,
    pub real_service_code: String,
}

/// Result of evaluating a verified response's error fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    /// `errorCode == "00"` and no batch status.
    Success,
    /// The whole request was rejected.
    Rejected(RequestError),
    /// The request succeeded and carries a batch-level status.
    Batch(BatchError),
}

impl CallStatus {
    /// Returns true only for [`CallStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, CallStatus::Success)
    }
}

/// Known disbursement lifecycle states reported in `batchErrorCode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchStatusCode {
    /// `DISB_PENDING`
    Pending,
    /// `DISB_CANCEL`
    Cancelled,
    /// `DISB_PROGRESS`
    InProgress,
    /// `DISB_TIMEOUT`
    TimedOut,
    /// `DISB_SUCCESS`
    Succeeded,
    /// `DISB_FAILED`
    Failed,
    /// Any code outside the known set, kept verbatim.
    Other(String),
}

impl BatchStatusCode {
    /// Maps a raw code to a known state.
    pub fn from_code(code: &str) -> Self {
        match code {
            "DISB_PENDING" => BatchStatusCode::Pending,
            "DISB_CANCEL" => BatchStatusCode::Cancelled,
            "DISB_PROGRESS" => BatchStatusCode::InProgress,
            "DISB_TIMEOUT" => BatchStatusCode::TimedOut,
            "DISB_SUCCESS" => BatchStatusCode::Succeeded,
            "DISB_FAILED" => BatchStatusCode::Failed,
            other => BatchStatusCode::Other(other.to_string()),
        }
    }

    /// Returns the wire code.
    pub fn as_code(&self) -> &str {
        match self {
            BatchStatusCode::Pending => "DISB_PENDING",
            BatchStatusCode::Cancelled => "DISB_CANCEL",
            BatchStatusCode::InProgress => "DISB_PROGRESS",
            BatchStatusCode::TimedOut => "DISB_TIMEOUT",
            BatchStatusCode::Succeeded => "DISB_SUCCESS",
            BatchStatusCode::Failed => "DISB_FAILED",
            BatchStatusCode::Other(code) => code,
        }
    }

    /// True once the batch can no longer change state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            BatchStatusCode::Cancelled
                | BatchStatusCode::TimedOut
                | BatchStatusCode::Succeeded
                | BatchStatusCode::Failed
        )
    }
}

impl fmt::Display for BatchStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// One call: command, caller payload and envelope recipe.
#[derive(Debug, Clone)]
pub struct Request<P> {
    command: Command,
    payload: P,
    envelope: EnvelopeBuilder,
}

impl<P> Request<P> {
    pub fn new(command: Command, payload: P, envelope: EnvelopeBuilder) -> Self {
        Self {
            command,
            payload,
            envelope,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn envelope(&self) -> &EnvelopeBuilder {
        &self.envelope
    }
}

/// Serde support for byte fields carried as standard base64 strings.
///
/// `null` and a missing field both decode to an empty vector.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Borrowing wrapper used when serializing by hand.
    pub struct Encoded<'a>(pub &'a [u8]);

    impl Serialize for Encoded<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serialize(self.0, serializer)
        }
    }

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Deserialize::deserialize(deserializer)?;
        match text {
            Some(text) => STANDARD.decode(text).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials<'static> {
        Credentials {
            username: "partner",
            encrypted_password: "ENC==",
            service_code: "SVC01",
        }
    }

    #[test]
    fn test_plain_envelope_field_order() {
        let envelope = EnvelopeBuilder::plain("ORD1").build(credentials(), vec![1, 2, 3]);

        assert_eq!(
            envelope.to_json().unwrap(),
            r#"{"username":"partner","password":"ENC==","serviceCode":"SVC01","orderId":"ORD1","data":"AQID"}"#
        );
    }

    #[test]
    fn test_disbursement_extension_is_derived_from_items() {
        let builder = EnvelopeBuilder::disbursement("ORD2", "Salary", [1000, 2500, 500]);
        assert_eq!(
            builder.extension(),
            &EnvelopeExtension::Disbursement {
                total_trans: 3,
                total_amount: 4000,
                trans_content: "Salary".to_string(),
            }
        );

        let json = builder.build(credentials(), vec![]).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"username":"partner","password":"ENC==","serviceCode":"SVC01","orderId":"ORD2","data":"","totalTrans":3,"totalAmount":4000,"transContent":"Salary"}"#
        );
    }

    #[test]
    fn test_empty_disbursement_batch() {
        let builder = EnvelopeBuilder::disbursement("ORD3", "", std::iter::empty());
        assert_eq!(
            builder.extension(),
            &EnvelopeExtension::Disbursement {
                total_trans: 0,
                total_amount: 0,
                trans_content: String::new(),
            }
        );
    }

    #[test]
    fn test_query_extension_with_selector() {
        let by_trans = EnvelopeBuilder::query(
            "ORD4",
            Some(QuerySelector::TransactionId("TX-9".to_string())),
        );
        let json = by_trans.build(credentials(), vec![]).to_json().unwrap();
        assert!(json.ends_with(r#""queryType":"transId","queryValue":"TX-9"}"#));

        let by_msisdn =
            EnvelopeBuilder::query("ORD4", Some(QuerySelector::Msisdn("84365233899".into())));
        let json = by_msisdn.build(credentials(), vec![]).to_json().unwrap();
        assert!(json.ends_with(r#""queryType":"msisdn","queryValue":"84365233899"}"#));
    }

    #[test]
    fn test_query_without_selector_omits_fields() {
        let json = EnvelopeBuilder::query("ORD5", None)
            .build(credentials(), vec![])
            .to_json()
            .unwrap();
        assert!(!json.contains("queryType"));
        assert!(!json.contains("queryValue"));
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::CHECK_ACCOUNT.as_str(), "VTP305");
        assert_eq!(Command::new("VTP999").to_string(), "VTP999");
        assert_ne!(Command::REQUEST_DISBURSEMENT, Command::QUERY_REQUESTS);
    }

    #[test]
    fn test_response_envelope_keeps_raw_data_bytes() {
        let text = r#"{"data": {"errorCode" : "00",  "orderId":"A"}, "signature":"AQI="}"#;
        let envelope = ResponseEnvelope::from_json(text).unwrap();

        assert_eq!(
            envelope.signed_bytes(),
            br#"{"errorCode" : "00",  "orderId":"A"}"#
        );
        assert_eq!(envelope.signature, vec![1, 2]);
    }

    #[test]
    fn test_response_envelope_bad_shape_is_transport_error() {
        for text in [
            "not json",
            r#"{"data":{}}"#,
            r#"{"signature":"AQI="}"#,
            r#"{"data":{},"signature":"%%"}"#,
        ] {
            let err = ResponseEnvelope::from_json(text).unwrap_err();
            assert!(
                matches!(err, crate::ProtocolError::Transport(_)),
                "{:?} gave {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_response_data_defaults_and_null_payload() {
        let data: ResponseEnvelopeData =
            serde_json::from_str(r#"{"errorCode":"00","data":null}"#).unwrap();
        assert!(data.data.is_empty());
        assert!(data.batch_error_code.is_none());
        assert_eq!(data.check_error(), CallStatus::Success);
    }

    #[test]
    fn test_error_precedence_request_over_batch() {
        let data = ResponseEnvelopeData {
            error_code: "P01".to_string(),
            error_desc: "bad signature".to_string(),
            batch_error_code: Some("DISB_FAILED".to_string()),
            ..Default::default()
        };
        assert_eq!(
            data.check_error(),
            CallStatus::Rejected(RequestError {
                code: "P01".to_string(),
                desc: "bad signature".to_string(),
            })
        );
    }

    #[test]
    fn test_batch_status_on_success() {
        let data = ResponseEnvelopeData {
            error_code: "00".to_string(),
            batch_error_code: Some("DISB_SUCCESS".to_string()),
            batch_error_desc: Some("paid".to_string()),
            ..Default::default()
        };
        match data.check_error() {
            CallStatus::Batch(batch) => {
                assert_eq!(batch.status(), BatchStatusCode::Succeeded);
                assert_eq!(batch.desc, "paid");
            }
            other => panic!("expected batch status, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_code_is_success() {
        let data = ResponseEnvelopeData {
            error_code: "00".to_string(),
            batch_error_code: Some(String::new()),
            ..Default::default()
        };
        assert!(data.check_error().is_success());
    }

    #[test]
    fn test_batch_status_codes() {
        for code in [
            "DISB_PENDING",
            "DISB_CANCEL",
            "DISB_PROGRESS",
            "DISB_TIMEOUT",
            "DISB_SUCCESS",
            "DISB_FAILED",
        ] {
            let status = BatchStatusCode::from_code(code);
            assert!(!matches!(status, BatchStatusCode::Other(_)), "{}", code);
            assert_eq!(status.as_code(), code);
        }

        let unknown = BatchStatusCode::from_code("DISB_NEW_STATE");
        assert_eq!(unknown, BatchStatusCode::Other("DISB_NEW_STATE".to_string()));
        assert_eq!(unknown.to_string(), "DISB_NEW_STATE");
        assert!(!unknown.is_final());
        assert!(BatchStatusCode::Succeeded.is_final());
        assert!(!BatchStatusCode::InProgress.is_final());
    }
}
