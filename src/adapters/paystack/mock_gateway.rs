//! Mock payment gateway for testing.
//!
//! Provides a configurable implementation of `PaymentGateway` for unit and
//! integration tests. Supports:
//! - Per-reference verify results
//! - Error injection per operation
//! - Call tracking
//! - Webhook decoding with a fixed test signature

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    GatewayError, GatewayWebhookEvent, InitializeChargeRequest, InitializedCharge, PaymentGateway,
    ProviderStatus, RefundChargeRequest, RefundOutcome, VerifiedCharge,
};

use super::paystack_types::decode_webhook_event;

/// Signature the mock accepts on webhooks.
pub const MOCK_WEBHOOK_SIGNATURE: &str = "mock-signature";

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.set_charge("KM_1", ProviderStatus::Success, 50_000);
/// let charge = gateway.verify("KM_1").await?;
/// assert_eq!(gateway.verify_calls(), 1);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Verify results keyed by reference.
    charges: HashMap<String, Result<VerifiedCharge, GatewayError>>,

    initialize_error: Option<GatewayError>,

    /// Next refund answer; defaults to accepted with a generated reference.
    refund_result: Option<Result<RefundOutcome, GatewayError>>,

    initialize_requests: Vec<InitializeChargeRequest>,
    verify_requests: Vec<String>,
    refund_requests: Vec<RefundChargeRequest>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Configure what `verify(reference)` reports.
    pub fn set_charge(&self, reference: &str, status: ProviderStatus, amount_paid: i64) {
        let charge = VerifiedCharge {
            status,
            reference: reference.to_string(),
            provider_transaction_id: Some(format!("tx_{}", reference)),
            amount_paid,
            currency: "NGN".to_string(),
            paid_at: (status == ProviderStatus::Success).then(Timestamp::now),
            gateway_response: match status {
                ProviderStatus::Success => "Successful",
                ProviderStatus::Failed => "Declined",
                ProviderStatus::Pending => "ongoing",
            }
            .to_string(),
            raw: serde_json::json!({ "reference": reference, "amount": amount_paid }),
        };
        self.state().charges.insert(reference.to_string(), Ok(charge));
    }

    /// Make `verify(reference)` fail.
    pub fn set_verify_error(&self, reference: &str, error: GatewayError) {
        self.state().charges.insert(reference.to_string(), Err(error));
    }

    pub fn set_initialize_error(&self, error: GatewayError) {
        self.state().initialize_error = Some(error);
    }

    pub fn set_refund_result(&self, result: Result<RefundOutcome, GatewayError>) {
        self.state().refund_result = Some(result);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn initialize_calls(&self) -> usize {
        self.state().initialize_requests.len()
    }

    pub fn initialize_requests(&self) -> Vec<InitializeChargeRequest> {
        self.state().initialize_requests.clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.state().verify_requests.len()
    }

    pub fn refund_requests(&self) -> Vec<RefundChargeRequest> {
        self.state().refund_requests.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initialize(
        &self,
        request: InitializeChargeRequest,
    ) -> Result<InitializedCharge, GatewayError> {
        let mut state = self.state();
        state.initialize_requests.push(request.clone());
        if let Some(error) = state.initialize_error.clone() {
            return Err(error);
        }
        Ok(InitializedCharge {
            authorization_url: format!("https://checkout.mock/{}", request.reference),
            access_code: format!("ac_{}", request.reference),
            reference: request.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedCharge, GatewayError> {
        let result = {
            let mut state = self.state();
            state.verify_requests.push(reference.to_string());
            state.charges.get(reference).cloned()
        };
        // Let concurrent callers interleave the way a network round trip would.
        tokio::task::yield_now().await;

        result.unwrap_or_else(|| Err(GatewayError::rejected("Transaction reference not found")))
    }

    async fn refund(&self, request: RefundChargeRequest) -> Result<RefundOutcome, GatewayError> {
        let mut state = self.state();
        let count = state.refund_requests.len() + 1;
        state.refund_requests.push(request);
        state.refund_result.clone().unwrap_or_else(|| {
            Ok(RefundOutcome {
                accepted: true,
                provider_refund_reference: Some(format!("rf_mock_{}", count)),
                message: "Refund has been queued for processing".to_string(),
            })
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayWebhookEvent, GatewayError> {
        if signature != MOCK_WEBHOOK_SIGNATURE {
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }
        decode_webhook_event(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GatewayErrorCode;

    #[tokio::test]
    async fn verify_returns_configured_charge() {
        let gateway = MockPaymentGateway::new();
        gateway.set_charge("KM_1", ProviderStatus::Success, 50_000);

        let charge = gateway.verify("KM_1").await.unwrap();
        assert_eq!(charge.status, ProviderStatus::Success);
        assert_eq!(charge.amount_paid, 50_000);
        assert_eq!(charge.provider_transaction_id.as_deref(), Some("tx_KM_1"));
        assert_eq!(gateway.verify_calls(), 1);
    }

    #[tokio::test]
    async fn verify_unknown_reference_is_rejected() {
        let gateway = MockPaymentGateway::new();
        let err = gateway.verify("nope").await.unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::Rejected);
    }

    #[tokio::test]
    async fn initialize_records_requests_and_injects_errors() {
        let gateway = MockPaymentGateway::new();
        let request = InitializeChargeRequest {
            email: "ada@example.com".into(),
            amount: 100,
            currency: "NGN".into(),
            reference: "KM_1".into(),
            metadata: serde_json::json!({}),
            callback_url: None,
        };

        let charge = gateway.initialize(request.clone()).await.unwrap();
        assert_eq!(charge.authorization_url, "https://checkout.mock/KM_1");

        gateway.set_initialize_error(GatewayError::unavailable("down"));
        assert!(gateway.initialize(request).await.is_err());
        assert_eq!(gateway.initialize_calls(), 2);
    }

    #[tokio::test]
    async fn refund_defaults_to_accepted() {
        let gateway = MockPaymentGateway::new();
        let outcome = gateway
            .refund(RefundChargeRequest {
                provider_transaction_id: "tx_1".into(),
                amount: 20_000,
                reason: "dropped".into(),
            })
            .await
            .unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.provider_refund_reference.as_deref(), Some("rf_mock_1"));
        assert_eq!(gateway.refund_requests()[0].amount, 20_000);
    }

    #[test]
    fn parse_webhook_requires_mock_signature() {
        let gateway = MockPaymentGateway::new();
        let payload = br#"{"event":"charge.success","data":{"reference":"KM_1"}}"#;

        assert!(gateway.parse_webhook(payload, "wrong").is_err());
        assert!(gateway.parse_webhook(payload, MOCK_WEBHOOK_SIGNATURE).is_ok());
    }
}
