//! Settlement error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PaymentNotFound / RefundNotFound / UserNotFound | 404 |
//! | NotRefundable / InvalidState | 409 |
//! | RefundInProgress | 409 |
//! | InvalidRefundAmount / ValidationFailed | 400 |
//! | AmountMismatch | 409 |
//! | GatewayRejected / RefundRejected | 402 |
//! | GatewayUnavailable | 503 |
//! | Forbidden | 403 |
//! | DispatchFailure / Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, RefundId, UserId, ValidationError,
};

use super::PaymentStatus;

const NOT_CONFIRMED: &str = "Payment not confirmed, try again";

/// Errors surfaced by the settlement and refund operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Transport failure, timeout or provider 5xx. Safe to retry.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Provider refused the request. Terminal for this attempt.
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Refund not found: {0}")]
    RefundNotFound(RefundId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Payment {payment_id} is {status} and cannot be refunded")]
    NotRefundable {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    #[error("Refund {refund_id} is already open for payment {payment_id}")]
    RefundInProgress {
        payment_id: PaymentId,
        refund_id: RefundId,
    },

    #[error("Refund amount {requested} must be between 1 and {max}")]
    InvalidRefundAmount { requested: i64, max: i64 },

    /// Provider declined the refund; message is the provider's own text.
    #[error("{0}")]
    RefundRejected(String),

    #[error("Cannot {attempted} while {current}")]
    InvalidState { current: String, attempted: String },

    /// Provider reported less than the payment amount. Left for manual review.
    #[error("Amount mismatch for {reference}: expected {expected}, provider reported {paid}")]
    AmountMismatch {
        reference: String,
        expected: i64,
        paid: i64,
    },

    #[error("Side effect dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("Validation failed for {field}: {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl SettlementError {
    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        SettlementError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SettlementError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Message safe to show an end user.
    ///
    /// Gateway failures on the payment path never leak provider text;
    /// refund rejections are shown verbatim to admins.
    pub fn user_message(&self) -> String {
        match self {
            SettlementError::GatewayUnavailable(_)
            | SettlementError::GatewayRejected(_)
            | SettlementError::AmountMismatch { .. } => NOT_CONFIRMED.to_string(),
            SettlementError::RefundRejected(message) => message.clone(),
            SettlementError::Infrastructure(_) | SettlementError::DispatchFailure(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::GatewayUnavailable(_) | SettlementError::Infrastructure(_)
        )
    }
}

impl From<DomainError> for SettlementError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => SettlementError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::DuplicateReference => SettlementError::ValidationFailed {
                field: "reference".to_string(),
                message: err.message,
            },
            ErrorCode::PaymentNotFound => SettlementError::PaymentNotFound(err.message),
            ErrorCode::InvalidStateTransition => SettlementError::InvalidState {
                current: err.details.get("from").cloned().unwrap_or_default(),
                attempted: format!(
                    "move to {}",
                    err.details.get("to").map(String::as_str).unwrap_or("?")
                ),
            },
            _ => SettlementError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for SettlementError {
    fn from(err: ValidationError) -> Self {
        SettlementError::ValidationFailed {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}
