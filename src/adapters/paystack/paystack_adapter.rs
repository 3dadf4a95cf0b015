//! Paystack payment gateway adapter.
//!
//! Implements the `PaymentGateway` port over Paystack's REST API.
//!
//! # Security
//!
//! - Bearer secret key held in `secrecy::SecretString`
//! - Webhooks authenticated with HMAC-SHA512 of the raw body keyed by the
//!   secret key, compared in constant time
//!
//! # Failure classification
//!
//! Transport errors, timeouts, HTTP 5xx and 429 are `Unavailable`. Any other
//! non-2xx response or a `status: false` envelope is `Rejected`.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::ports::{
    GatewayError, GatewayWebhookEvent, InitializeChargeRequest, InitializedCharge, PaymentGateway,
    RefundChargeRequest, RefundOutcome, VerifiedCharge,
};

use super::paystack_types::{
    decode_webhook_event, hex_decode, refund_reference_of, InitializeBody, InitializeData,
    PaystackEnvelope, RefundBody, VerifyData,
};

type HmacSha512 = Hmac<Sha512>;

/// Paystack API configuration.
#[derive(Clone)]
pub struct PaystackConfig {
    /// Secret key (sk_live_... or sk_test_...). Also keys webhook signatures.
    secret_key: SecretString,

    /// Base URL for the API (default: https://api.paystack.co).
    base_url: String,

    /// Per-request timeout.
    timeout: Duration,
}

impl PaystackConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            base_url: "https://api.paystack.co".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Paystack gateway adapter.
pub struct PaystackGateway {
    config: PaystackConfig,
    http_client: reqwest::Client,
}

impl PaystackGateway {
    /// Builds the adapter with a client that enforces the configured timeout.
    pub fn new(config: PaystackConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Verify `x-paystack-signature` against the raw body.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError> {
        let provided = hex_decode(signature).ok_or_else(|| {
            tracing::warn!("Webhook signature is not valid hex");
            GatewayError::invalid_webhook("Malformed signature")
        })?;

        let mut mac = HmacSha512::new_from_slice(self.config.secret_key.expose_secret().as_bytes())
            .map_err(|e| GatewayError::invalid_webhook(format!("Invalid webhook key: {}", e)))?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let expected_bytes: &[u8] = expected.as_slice();
        if expected_bytes.ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            tracing::warn!(payload_len = payload.len(), "Invalid webhook signature");
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Send an authenticated request and unwrap the HTTP layer into an envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<PaystackEnvelope<T>, GatewayError> {
        let response = request
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(operation, error = %e, timeout = e.is_timeout(), "Paystack request failed");
                GatewayError::unavailable(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::unavailable(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(operation, status = %status, "Paystack API error");
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::invalid_response(format!("Failed to parse Paystack {} response: {}", operation, e))
        })
    }
}

/// Turns a non-2xx response into a typed error, keeping Paystack's message.
fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Paystack returned HTTP {}", status.as_u16()));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::unavailable(message)
    } else {
        GatewayError::rejected(message)
    }
}

/// Unwraps `data` from an envelope, treating `status: false` as a rejection.
fn into_data<T>(envelope: PaystackEnvelope<T>, operation: &str) -> Result<T, GatewayError> {
    if !envelope.status {
        return Err(GatewayError::rejected(envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::invalid_response(format!("Paystack {} response has no data", operation)))
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(
        &self,
        request: InitializeChargeRequest,
    ) -> Result<InitializedCharge, GatewayError> {
        let url = format!("{}/transaction/initialize", self.config.base_url);
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount.to_string(),
            currency: &request.currency,
            reference: &request.reference,
            metadata: &request.metadata,
            callback_url: request.callback_url.as_deref(),
        };

        let envelope = self
            .send::<InitializeData>(self.http_client.post(&url).json(&body), "initialize")
            .await?;
        let data = into_data(envelope, "initialize")?;

        Ok(InitializedCharge {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedCharge, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.config.base_url, reference);

        let envelope = self
            .send::<serde_json::Value>(self.http_client.get(&url), "verify")
            .await?;
        let raw = into_data(envelope, "verify")?;
        let data: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::invalid_response(format!("Unexpected verify payload: {}", e)))?;

        Ok(VerifiedCharge {
            status: data.provider_status(),
            reference: data.reference.clone(),
            provider_transaction_id: data.id.map(|id| id.to_string()),
            amount_paid: data.amount,
            currency: data.currency.clone(),
            paid_at: data.paid_at(),
            gateway_response: data
                .gateway_response
                .clone()
                .unwrap_or_else(|| data.status.clone()),
            raw,
        })
    }

    async fn refund(&self, request: RefundChargeRequest) -> Result<RefundOutcome, GatewayError> {
        let url = format!("{}/refund", self.config.base_url);
        let body = RefundBody {
            transaction: &request.provider_transaction_id,
            amount: request.amount,
            reason: &request.reason,
        };

        let envelope = self
            .send::<serde_json::Value>(self.http_client.post(&url).json(&body), "refund")
            .await?;

        if !envelope.status {
            return Ok(RefundOutcome {
                accepted: false,
                provider_refund_reference: None,
                message: envelope.message,
            });
        }

        Ok(RefundOutcome {
            accepted: true,
            provider_refund_reference: envelope.data.as_ref().and_then(refund_reference_of),
            message: envelope.message,
        })
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayWebhookEvent, GatewayError> {
        self.verify_signature(payload, signature)?;
        let event = decode_webhook_event(payload)?;

        tracing::info!(event = ?event, "Webhook signature verified");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paystack::paystack_types::hex_encode;
    use crate::ports::GatewayErrorCode;

    fn gateway() -> PaystackGateway {
        PaystackGateway::new(PaystackConfig::new("sk_test_secret")).unwrap()
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex_encode(&mac.finalize().into_bytes())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_defaults_to_paystack_api() {
        let config = PaystackConfig::new("sk_test_secret");
        assert_eq!(config.base_url, "https://api.paystack.co");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_with_base_url_strips_trailing_slash() {
        let config = PaystackConfig::new("sk").with_base_url("http://localhost:9000/");
        assert_eq!(config.base_url, "http://localhost:9000");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Classification
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn server_errors_are_unavailable() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err.code, GatewayErrorCode::Unavailable);
        assert!(err.retryable);
        assert_eq!(err.message, "Paystack returned HTTP 502");
    }

    #[test]
    fn rate_limit_is_unavailable() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "{}");
        assert_eq!(err.code, GatewayErrorCode::Unavailable);
    }

    #[test]
    fn client_errors_are_rejected_with_provider_message() {
        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"status":false,"message":"Transaction reference not found"}"#,
        );
        assert_eq!(err.code, GatewayErrorCode::Rejected);
        assert_eq!(err.message, "Transaction reference not found");
    }

    #[test]
    fn false_status_envelope_is_rejected() {
        let envelope: PaystackEnvelope<InitializeData> =
            serde_json::from_str(r#"{"status":false,"message":"Duplicate Transaction Reference"}"#)
                .unwrap();
        let err = into_data(envelope, "initialize").unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::Rejected);
        assert_eq!(err.message, "Duplicate Transaction Reference");
    }

    #[test]
    fn missing_data_is_invalid_response() {
        let envelope: PaystackEnvelope<InitializeData> =
            serde_json::from_str(r#"{"status":true,"message":"ok"}"#).unwrap();
        let err = into_data(envelope, "initialize").unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::InvalidResponse);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_webhook_accepts_valid_signature() {
        let payload = br#"{"event":"charge.success","data":{"reference":"KM_1"}}"#;
        let signature = sign("sk_test_secret", payload);

        let event = gateway().parse_webhook(payload, &signature).unwrap();
        assert_eq!(
            event,
            GatewayWebhookEvent::ChargeSuccess {
                reference: "KM_1".into()
            }
        );
    }

    #[test]
    fn parse_webhook_rejects_wrong_key() {
        let payload = br#"{"event":"charge.success","data":{"reference":"KM_1"}}"#;
        let signature = sign("sk_other", payload);

        let err = gateway().parse_webhook(payload, &signature).unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::InvalidWebhook);
    }

    #[test]
    fn parse_webhook_rejects_tampered_body() {
        let signature = sign(
            "sk_test_secret",
            br#"{"event":"charge.success","data":{"reference":"KM_1"}}"#,
        );
        let tampered = br#"{"event":"charge.success","data":{"reference":"KM_2"}}"#;

        assert!(gateway().parse_webhook(tampered, &signature).is_err());
    }

    #[test]
    fn parse_webhook_rejects_non_hex_signature() {
        let err = gateway().parse_webhook(b"{}", "not-hex!").unwrap_err();
        assert_eq!(err.code, GatewayErrorCode::InvalidWebhook);
    }
}
