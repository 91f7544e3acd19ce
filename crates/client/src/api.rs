//! Typed partner API calls on top of the envelope processor.

use std::sync::Arc;

use protocol::{
    Command, EnvelopeBuilder, EnvelopeProcessor, KeyStore, Outcome, ProcessorOptions,
    QuerySelector, Request, Result, Transport,
};
use serde::{Deserialize, Serialize};

/// One subscriber to look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAccount {
    pub msisdn: String,
    pub customer_name: String,
}

/// Result of one account lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckAccountResult {
    pub msisdn: String,
    pub customer_name: String,
    /// Wallet package the subscriber is enrolled in.
    pub package: String,
    pub error_code: String,
    pub error_msg: String,
}

/// One transfer of a disbursement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disbursement {
    /// Partner-side transaction id, unique per item.
    pub trans_id: String,
    pub msisdn: String,
    pub customer_name: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sms_content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// Per-item status of a disbursement, as returned by submissions and queries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisbursementResult {
    pub trans_id: String,
    pub msisdn: String,
    pub amount: u64,
    pub error_code: String,
    pub error_msg: String,
}

impl DisbursementResult {
    pub fn is_success(&self) -> bool {
        self.error_code == protocol::SUCCESS_CODE
    }
}

/// Returns a fresh order id: 32 upper-case hex digits.
pub fn generate_order_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Partner API client.
#[derive(Debug)]
pub struct PartnerApi<T> {
    processor: EnvelopeProcessor<T>,
}

impl<T: Transport> PartnerApi<T> {
    pub fn new(keys: Arc<KeyStore>, transport: T, options: ProcessorOptions) -> Result<Self> {
        Ok(Self {
            processor: EnvelopeProcessor::new(keys, transport, options)?,
        })
    }

    pub fn from_processor(processor: EnvelopeProcessor<T>) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &EnvelopeProcessor<T> {
        &self.processor
    }

    /// Looks up subscribers before paying them.
    pub async fn check_account(
        &self,
        order_id: &str,
        accounts: &[CheckAccount],
    ) -> Result<Outcome<Vec<CheckAccountResult>>> {
        tracing::info!(order_id, count = accounts.len(), "checking accounts");
        let request = Request::new(
            Command::CHECK_ACCOUNT,
            accounts,
            EnvelopeBuilder::plain(order_id),
        );
        self.processor.process(&request).await
    }

    /// Submits a disbursement batch. Totals are derived from the items.
    pub async fn request_disbursement(
        &self,
        order_id: &str,
        content: &str,
        items: &[Disbursement],
    ) -> Result<Outcome<Vec<DisbursementResult>>> {
        tracing::info!(order_id, count = items.len(), "requesting disbursement");
        let request = Request::new(
            Command::REQUEST_DISBURSEMENT,
            items,
            EnvelopeBuilder::disbursement(order_id, content, items.iter().map(|item| item.amount)),
        );
        self.processor.process(&request).await
    }

    /// Queries the status of an earlier batch, optionally narrowed by a selector.
    pub async fn query_requests(
        &self,
        order_id: &str,
        selector: Option<QuerySelector>,
    ) -> Result<Outcome<Vec<DisbursementResult>>> {
        tracing::info!(order_id, ?selector, "querying requests");
        let request = Request::new(
            Command::QUERY_REQUESTS,
            Vec::<DisbursementResult>::new(),
            EnvelopeBuilder::query(order_id, selector),
        );
        self.processor.process(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_order_id() {
        let a = generate_order_id();
        let b = generate_order_id();

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_check_account_wire_names() {
        let json = serde_json::to_string(&CheckAccount {
            msisdn: "84365232398".to_string(),
            customer_name: "Nguyen Van A".to_string(),
        })
        .unwrap();

        assert_eq!(json, r#"{"msisdn":"84365232398","customerName":"Nguyen Van A"}"#);
    }

    #[test]
    fn test_check_account_result_tolerates_missing_fields() {
        let result: CheckAccountResult =
            serde_json::from_str(r#"{"msisdn":"84365232398","errorCode":"00"}"#).unwrap();

        assert_eq!(result.msisdn, "84365232398");
        assert_eq!(result.error_code, "00");
        assert!(result.package.is_empty());
    }

    #[test]
    fn test_disbursement_skips_empty_optional_text() {
        let value = serde_json::to_value(Disbursement {
            trans_id: "T1".to_string(),
            msisdn: "84365232398".to_string(),
            customer_name: "Nguyen Van A".to_string(),
            amount: 10_000,
            sms_content: String::new(),
            note: "bonus".to_string(),
        })
        .unwrap();

        assert_eq!(value["transId"], "T1");
        assert_eq!(value["amount"], 10_000);
        assert_eq!(value["note"], "bonus");
        assert!(value.get("smsContent").is_none());
    }

    #[test]
    fn test_disbursement_result_success() {
        let ok = DisbursementResult {
            error_code: "00".to_string(),
            ..Default::default()
        };
        let failed = DisbursementResult {
            error_code: "P01".to_string(),
            ..Default::default()
        };

        assert!(ok.is_success());
        assert!(!failed.is_success());
    }
}
