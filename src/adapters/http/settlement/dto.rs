//! HTTP DTOs for the settlement endpoints.
//!
//! Amounts are minor units (kobo); timestamps are RFC 3339.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{
    ChargeInstallmentResult, CompleteRefundResult, InitializePaymentResult, VerifyAndSettleResult,
};
use crate::application::DispatchStatus;
use crate::domain::foundation::Timestamp;
use crate::domain::payment::{Payment, PaymentStatus, PaymentType};
use crate::domain::refund::{Refund, RefundStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct InitializePaymentRequest {
    pub payment_type: PaymentType,
    pub amount: i64,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    /// Caller-chosen idempotency reference; generated when absent.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentHistoryParams {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstallmentPlanRequest {
    pub course_id: String,
    pub total_amount: i64,
    pub installments: u32,
    /// RFC 3339; defaults to now.
    #[serde(default)]
    pub first_due_date: Option<String>,
    #[serde(default)]
    pub interval_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestRefundRequest {
    pub reason: String,
    /// Partial refund in minor units; the full payment when absent.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveRefundRequest {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub pending_older_than_secs: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

fn rfc3339(ts: &Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub reference: String,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub user_id: String,
    pub course_id: Option<String>,
    pub application_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub due_date: Option<String>,
    pub paid_at: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

impl From<&Payment> for PaymentResponse {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id.to_string(),
            reference: p.reference.to_string(),
            payment_type: p.payment_type,
            amount: p.amount.minor_units(),
            currency: p.currency.clone(),
            status: p.status,
            user_id: p.user_id.to_string(),
            course_id: p.course_id.as_ref().map(|c| c.to_string()),
            application_id: p.application_id.clone(),
            enrollment_id: p.enrollment_id.clone(),
            due_date: p.due_date.as_ref().map(rfc3339),
            paid_at: p.paid_at.as_ref().map(rfc3339),
            failure_reason: p.failure_reason.clone(),
            created_at: rfc3339(&p.created_at),
        }
    }
}

/// Checkout handed to the payer's browser.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub payment: PaymentResponse,
    pub authorization_url: String,
    pub access_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

impl From<InitializePaymentResult> for CheckoutResponse {
    fn from(r: InitializePaymentResult) -> Self {
        Self {
            payment: PaymentResponse::from(&r.payment),
            authorization_url: r.authorization_url,
            access_code: r.access_code,
            replaces: None,
        }
    }
}

impl From<ChargeInstallmentResult> for CheckoutResponse {
    fn from(r: ChargeInstallmentResult) -> Self {
        Self {
            payment: PaymentResponse::from(&r.payment),
            authorization_url: r.authorization_url,
            access_code: r.access_code,
            replaces: r.replaces.map(|reference| reference.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
}

impl From<Vec<Payment>> for PaymentListResponse {
    fn from(payments: Vec<Payment>) -> Self {
        Self {
            payments: payments.iter().map(PaymentResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub confirmed: bool,
    pub status: PaymentStatus,
    /// `applied`, `failed` or `not_run`
    pub dispatch: &'static str,
    pub enrollment_id: Option<String>,
    pub payment: PaymentResponse,
}

impl From<VerifyAndSettleResult> for VerifyResponse {
    fn from(r: VerifyAndSettleResult) -> Self {
        let enrollment_id = match &r.dispatch {
            DispatchStatus::Applied(outcome) => outcome.enrollment_id().map(str::to_string),
            _ => None,
        }
        .or_else(|| r.payment.enrollment_id.clone());

        Self {
            confirmed: r.confirmed,
            status: r.payment_status,
            dispatch: dispatch_label(&r.dispatch),
            enrollment_id,
            payment: PaymentResponse::from(&r.payment),
        }
    }
}

pub fn dispatch_label(status: &DispatchStatus) -> &'static str {
    match status {
        DispatchStatus::Applied(_) => "applied",
        DispatchStatus::Failed(_) => "failed",
        DispatchStatus::NotRun => "not_run",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub reason: String,
    pub status: RefundStatus,
    pub provider_refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub requested_by: Option<String>,
    pub requested_at: String,
    pub completed_at: Option<String>,
}

impl From<&Refund> for RefundResponse {
    fn from(r: &Refund) -> Self {
        Self {
            id: r.id.to_string(),
            payment_id: r.payment_id.to_string(),
            amount: r.amount.minor_units(),
            currency: r.currency.clone(),
            reason: r.reason.clone(),
            status: r.status,
            provider_refund_reference: r.provider_refund_reference.clone(),
            failure_reason: r.failure_reason.clone(),
            admin_notes: r.admin_notes.clone(),
            rejection_reason: r.rejection_reason.clone(),
            requested_by: r.requested_by.clone(),
            requested_at: rfc3339(&r.requested_at),
            completed_at: r.completed_at.as_ref().map(rfc3339),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundListResponse {
    pub refunds: Vec<RefundResponse>,
}

impl From<Vec<Refund>> for RefundListResponse {
    fn from(refunds: Vec<Refund>) -> Self {
        Self {
            refunds: refunds.iter().map(RefundResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteRefundResponse {
    pub refund: RefundResponse,
    pub payment_status: PaymentStatus,
}

impl From<CompleteRefundResult> for CompleteRefundResponse {
    fn from(r: CompleteRefundResult) -> Self {
        Self {
            refund: RefundResponse::from(&r.refund),
            payment_status: r.payment_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub reference: String,
    pub dispatch: &'static str,
}

/// Standard error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::EffectOutcome;
    use crate::domain::foundation::{Amount, CourseId, UserId};
    use crate::domain::payment::{PaymentReference, PaymentTransition};

    fn tuition() -> Payment {
        Payment::pending(
            PaymentReference::new("KM_1").unwrap(),
            PaymentType::Tuition,
            Amount::new(50_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            Some(CourseId::new("course-1").unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn payment_response_uses_wire_names() {
        let json = serde_json::to_value(PaymentResponse::from(&tuition())).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["payment_type"], "TUITION");
        assert_eq!(json["amount"], 50_000);
        assert_eq!(json["reference"], "KM_1");
        assert!(json["paid_at"].is_null());
    }

    #[test]
    fn verify_response_surfaces_new_enrollment() {
        let paid = PaymentTransition::settle(Some("tx_1".into()), Timestamp::now()).apply_to(&tuition());
        let result = VerifyAndSettleResult {
            confirmed: true,
            payment_status: PaymentStatus::Paid,
            payment: paid,
            dispatch: DispatchStatus::Applied(EffectOutcome::Enrolled {
                enrollment_id: "enr-1".into(),
                created: true,
            }),
        };

        let response = VerifyResponse::from(result);
        assert!(response.confirmed);
        assert_eq!(response.dispatch, "applied");
        assert_eq!(response.enrollment_id.as_deref(), Some("enr-1"));
    }

    #[test]
    fn initialize_request_accepts_minimal_body() {
        let request: InitializePaymentRequest =
            serde_json::from_str(r#"{"payment_type":"APPLICATION_FEE","amount":5000}"#).unwrap();
        assert_eq!(request.payment_type, PaymentType::ApplicationFee);
        assert!(request.reference.is_none());
    }

    #[test]
    fn error_response_omits_retryable_when_unset() {
        let json = serde_json::to_string(&ErrorResponse::new("NOT_FOUND", "Not found")).unwrap();
        assert!(!json.contains("retryable"));

        let json =
            serde_json::to_string(&ErrorResponse::new("GATEWAY_UNAVAILABLE", "x").retryable(true))
                .unwrap();
        assert!(json.contains(r#""retryable":true"#));
    }
}
