//! Payment gateway port for external charge processing.
//!
//! Defines the contract for the card/bank gateway (e.g., Paystack).
//! Implementations are stateless request/response clients and safe to call
//! concurrently; the provider deduplicates by reference and transaction id.
//!
//! # Design
//!
//! - **Typed failures**: every non-success is a [`GatewayError`], never swallowed
//! - **No retry policy**: callers decide whether to retry using `retryable`
//! - **Webhooks**: signature checks live here so handlers never see unsigned input

use crate::domain::foundation::Timestamp;
use crate::domain::payment::SettlementError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for payment gateway integrations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a charge and get the hosted checkout URL.
    async fn initialize(
        &self,
        request: InitializeChargeRequest,
    ) -> Result<InitializedCharge, GatewayError>;

    /// Look up the provider's view of a charge by our reference.
    async fn verify(&self, reference: &str) -> Result<VerifiedCharge, GatewayError>;

    /// Ask the provider to return money for a settled transaction.
    ///
    /// A refund the provider declines is `Ok` with `accepted: false` when the
    /// provider answered normally, or a `Rejected` error otherwise.
    async fn refund(&self, request: RefundChargeRequest) -> Result<RefundOutcome, GatewayError>;

    /// Verify a webhook signature and parse the event.
    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayWebhookEvent, GatewayError>;
}

/// Request to initialize a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeChargeRequest {
    pub email: String,

    /// Minor currency units.
    pub amount: i64,

    pub currency: String,
    pub reference: String,
    pub metadata: serde_json::Value,

    /// Where the provider redirects the payer after checkout.
    pub callback_url: Option<String>,
}

/// Charge created at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializedCharge {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Provider-reported outcome of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Success,
    Failed,

    /// Still in flight (ongoing, pending, processing, queued).
    Pending,
}

/// Result of verifying a charge by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedCharge {
    pub status: ProviderStatus,
    pub reference: String,
    pub provider_transaction_id: Option<String>,

    /// Minor currency units actually collected.
    pub amount_paid: i64,

    pub currency: String,
    pub paid_at: Option<Timestamp>,

    /// Provider's own status word (e.g. "abandoned"); used as failure reason.
    pub gateway_response: String,

    /// Raw provider payload for audit.
    pub raw: serde_json::Value,
}

/// Request to refund a settled transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundChargeRequest {
    pub provider_transaction_id: String,

    /// Minor currency units.
    pub amount: i64,

    pub reason: String,
}

/// Provider's answer to a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub accepted: bool,
    pub provider_refund_reference: Option<String>,
    pub message: String,
}

/// Webhook event from the gateway, after signature verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayWebhookEvent {
    /// A charge succeeded. Amounts are re-verified, never trusted from here.
    ChargeSuccess { reference: String },

    /// A refund was paid out by the provider.
    RefundProcessed { provider_refund_reference: String },

    /// The provider gave up on a refund.
    RefundFailed {
        provider_refund_reference: String,
        reason: String,
    },

    /// Any other event type; acknowledged and ignored.
    Other { event: String },
}

/// Error codes for gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Transport error, timeout, 5xx or rate limit.
    Unavailable,

    /// The provider answered and refused.
    Rejected,

    /// The provider answered with something we cannot parse.
    InvalidResponse,

    /// Webhook signature or payload invalid.
    InvalidWebhook,
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayErrorCode::Unavailable)
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Unavailable => "gateway_unavailable",
            GatewayErrorCode::Rejected => "gateway_rejected",
            GatewayErrorCode::InvalidResponse => "invalid_response",
            GatewayErrorCode::InvalidWebhook => "invalid_webhook",
        };
        write!(f, "{}", s)
    }
}

/// Errors from gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Unavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Rejected, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidWebhook, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for SettlementError {
    fn from(err: GatewayError) -> Self {
        match err.code {
            GatewayErrorCode::Unavailable | GatewayErrorCode::InvalidResponse => {
                SettlementError::GatewayUnavailable(err.message)
            }
            GatewayErrorCode::Rejected => SettlementError::GatewayRejected(err.message),
            GatewayErrorCode::InvalidWebhook => SettlementError::Forbidden(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(GatewayError::unavailable("timeout").retryable);
        assert!(!GatewayError::rejected("declined").retryable);
        assert!(!GatewayError::invalid_response("bad json").retryable);
        assert!(!GatewayError::invalid_webhook("bad sig").retryable);
    }

    #[test]
    fn converts_to_settlement_error() {
        assert_eq!(
            SettlementError::from(GatewayError::unavailable("timeout")),
            SettlementError::GatewayUnavailable("timeout".into())
        );
        assert_eq!(
            SettlementError::from(GatewayError::rejected("Invalid key")),
            SettlementError::GatewayRejected("Invalid key".into())
        );
    }

    #[test]
    fn error_display_includes_code() {
        let err = GatewayError::rejected("Transaction reference not found");
        assert_eq!(
            err.to_string(),
            "gateway_rejected: Transaction reference not found"
        );
    }
}
