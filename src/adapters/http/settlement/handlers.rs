//! HTTP handlers for payment, refund, admin and webhook endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::{
    ApproveRefundCommand, ApproveRefundHandler, ChargeInstallmentCommand,
    ChargeInstallmentHandler, CheckoutSettings, CompleteRefundCommand, CompleteRefundHandler,
    CreateInstallmentPlanCommand, CreateInstallmentPlanHandler, FailRefundCommand,
    FailRefundHandler, GetPaymentHistoryHandler, GetPaymentHistoryQuery, GetPendingRefundsHandler,
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
    InitializePaymentCommand, InitializePaymentHandler, ReconcilePaymentsCommand,
    ReconcilePaymentsHandler, RejectRefundCommand, RejectRefundHandler, RequestRefundCommand,
    RequestRefundHandler, RetryDispatchCommand, RetryDispatchHandler, VerifyAndSettleCommand,
    VerifyAndSettleHandler,
};
use crate::application::SideEffectDispatcher;
use crate::domain::foundation::{CourseId, PaymentId, RefundId, Timestamp, ValidationError};
use crate::domain::payment::{PaymentReference, SettlementError};
use crate::ports::{PaymentGateway, PaymentLedger, RefundRepository, UserDirectory};

use super::super::caller::{AdminUser, AuthenticatedUser};
use super::dto::{
    dispatch_label, ApproveRefundRequest, CheckoutResponse, CompleteRefundResponse,
    CreateInstallmentPlanRequest, DispatchResponse, ErrorResponse, InitializePaymentRequest,
    PaymentHistoryParams, PaymentListResponse, ReasonRequest, ReconcileRequest,
    RefundListResponse, RefundResponse, RequestRefundRequest, VerifyResponse,
};

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared dependencies; handlers are built per request from these.
#[derive(Clone)]
pub struct SettlementAppState {
    pub ledger: Arc<dyn PaymentLedger>,
    pub refunds: Arc<dyn RefundRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub users: Arc<dyn UserDirectory>,
    pub dispatcher: SideEffectDispatcher,
    pub checkout: CheckoutSettings,
}

impl SettlementAppState {
    pub fn initialize_payment_handler(&self) -> InitializePaymentHandler {
        InitializePaymentHandler::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.users.clone(),
            self.checkout.clone(),
        )
    }

    pub fn verify_handler(&self) -> VerifyAndSettleHandler {
        VerifyAndSettleHandler::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.dispatcher.clone(),
        )
    }

    pub fn history_handler(&self) -> GetPaymentHistoryHandler {
        GetPaymentHistoryHandler::new(self.ledger.clone())
    }

    pub fn installment_plan_handler(&self) -> CreateInstallmentPlanHandler {
        CreateInstallmentPlanHandler::new(self.ledger.clone(), self.checkout.clone())
    }

    pub fn charge_installment_handler(&self) -> ChargeInstallmentHandler {
        ChargeInstallmentHandler::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.users.clone(),
            self.checkout.clone(),
        )
    }

    pub fn request_refund_handler(&self) -> RequestRefundHandler {
        RequestRefundHandler::new(self.ledger.clone(), self.refunds.clone(), self.gateway.clone())
    }

    pub fn complete_refund_handler(&self) -> CompleteRefundHandler {
        CompleteRefundHandler::new(self.ledger.clone(), self.refunds.clone())
    }

    pub fn fail_refund_handler(&self) -> FailRefundHandler {
        FailRefundHandler::new(self.refunds.clone())
    }

    pub fn approve_refund_handler(&self) -> ApproveRefundHandler {
        ApproveRefundHandler::new(self.refunds.clone())
    }

    pub fn reject_refund_handler(&self) -> RejectRefundHandler {
        RejectRefundHandler::new(self.refunds.clone())
    }

    pub fn pending_refunds_handler(&self) -> GetPendingRefundsHandler {
        GetPendingRefundsHandler::new(self.refunds.clone())
    }

    pub fn reconcile_handler(&self) -> ReconcilePaymentsHandler {
        ReconcilePaymentsHandler::new(
            self.ledger.clone(),
            Arc::new(self.verify_handler()),
            self.dispatcher.clone(),
        )
    }

    pub fn retry_dispatch_handler(&self) -> RetryDispatchHandler {
        RetryDispatchHandler::new(self.ledger.clone(), self.dispatcher.clone())
    }

    pub fn webhook_handler(&self) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(
            self.gateway.clone(),
            self.refunds.clone(),
            Arc::new(self.verify_handler()),
            Arc::new(self.complete_refund_handler()),
            Arc::new(self.fail_refund_handler()),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Payer Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/payments - Create a payment and start checkout
pub async fn initialize_payment(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let course_id = request.course_id.map(CourseId::new).transpose()?;
    let cmd = InitializePaymentCommand {
        user_id: user.user_id,
        payment_type: request.payment_type,
        amount: request.amount,
        course_id,
        application_id: request.application_id,
        reference: request.reference,
        metadata: request.metadata,
    };

    let result = state.initialize_payment_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// GET /api/payments - Caller's payments, newest first
pub async fn payment_history(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
    Query(params): Query<PaymentHistoryParams>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let query = GetPaymentHistoryQuery {
        user_id: user.user_id,
        status: params.status,
    };
    let payments = state.history_handler().handle(query).await?;
    Ok(Json(PaymentListResponse::from(payments)))
}

/// GET /api/payments/pending - Caller's outstanding charges
pub async fn pending_payments(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, SettlementApiError> {
    let payments = state
        .history_handler()
        .handle(GetPaymentHistoryQuery::pending(user.user_id))
        .await?;
    Ok(Json(PaymentListResponse::from(payments)))
}

/// POST /api/payments/:reference/verify - Confirm with the gateway and settle
pub async fn verify_payment(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let parsed = PaymentReference::new(reference.as_str())
        .map_err(|_| SettlementError::PaymentNotFound(reference.clone()))?;
    let payment = state
        .ledger
        .find_by_reference(&parsed)
        .await?
        .ok_or_else(|| SettlementError::PaymentNotFound(reference.clone()))?;
    if !user.can_access(&payment.user_id) {
        return Err(SettlementError::Forbidden(format!("payment {}", reference)).into());
    }

    let result = state
        .verify_handler()
        .handle(VerifyAndSettleCommand { reference })
        .await?;

    Ok(Json(VerifyResponse::from(result)))
}

/// POST /api/installment-plans - Split a course fee into scheduled slices
pub async fn create_installment_plan(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateInstallmentPlanRequest>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let first_due_date = match request.first_due_date.as_deref() {
        Some(raw) => Some(Timestamp::parse_rfc3339(raw).ok_or_else(|| {
            SettlementError::validation("first_due_date", "expected an RFC 3339 timestamp")
        })?),
        None => None,
    };
    let cmd = CreateInstallmentPlanCommand {
        user_id: user.user_id,
        course_id: CourseId::new(request.course_id)?,
        total_amount: request.total_amount,
        installments: request.installments,
        first_due_date,
        interval_days: request.interval_days,
    };

    let result = state.installment_plan_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(PaymentListResponse::from(result.payments))))
}

/// POST /api/installments/:payment_id/charge - Start checkout for one slice
pub async fn charge_installment(
    State(state): State<SettlementAppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<PaymentId>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let cmd = ChargeInstallmentCommand {
        payment_id,
        user_id: user.user_id,
    };
    let result = state.charge_installment_handler().handle(cmd).await?;
    Ok(Json(CheckoutResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/admin/payments/:payment_id/refunds - Refund a PAID payment
pub async fn request_refund(
    State(state): State<SettlementAppState>,
    AdminUser(admin): AdminUser,
    Path(payment_id): Path<PaymentId>,
    Json(request): Json<RequestRefundRequest>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let cmd = RequestRefundCommand {
        payment_id,
        reason: request.reason,
        amount: request.amount,
        admin_notes: request.admin_notes,
        requested_by: Some(admin.user_id.to_string()),
    };

    let result = state.request_refund_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(RefundResponse::from(&result.refund))))
}

/// GET /api/admin/payments/:payment_id/refunds - Refund history of a payment
pub async fn payment_refunds(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(payment_id): Path<PaymentId>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let refunds = state.refunds.list_for_payment(&payment_id).await?;
    Ok(Json(RefundListResponse::from(refunds)))
}

/// GET /api/admin/refunds - Open refunds, oldest first
pub async fn pending_refunds(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, SettlementApiError> {
    let refunds = state.pending_refunds_handler().handle().await?;
    Ok(Json(RefundListResponse::from(refunds)))
}

/// POST /api/admin/refunds/:refund_id/approve
pub async fn approve_refund(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(refund_id): Path<RefundId>,
    request: Option<Json<ApproveRefundRequest>>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let Json(request) = request.unwrap_or_default();
    let refund = state
        .approve_refund_handler()
        .handle(ApproveRefundCommand {
            refund_id,
            admin_notes: request.admin_notes,
        })
        .await?;
    Ok(Json(RefundResponse::from(&refund)))
}

/// POST /api/admin/refunds/:refund_id/reject
pub async fn reject_refund(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(refund_id): Path<RefundId>,
    Json(request): Json<ReasonRequest>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let refund = state
        .reject_refund_handler()
        .handle(RejectRefundCommand {
            refund_id,
            reason: request.reason,
        })
        .await?;
    Ok(Json(RefundResponse::from(&refund)))
}

/// POST /api/admin/refunds/:refund_id/complete - Money confirmed returned
pub async fn complete_refund(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(refund_id): Path<RefundId>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let result = state
        .complete_refund_handler()
        .handle(CompleteRefundCommand { refund_id })
        .await?;
    Ok(Json(CompleteRefundResponse::from(result)))
}

/// POST /api/admin/refunds/:refund_id/fail
pub async fn fail_refund(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(refund_id): Path<RefundId>,
    Json(request): Json<ReasonRequest>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let refund = state
        .fail_refund_handler()
        .handle(FailRefundCommand {
            refund_id,
            reason: request.reason,
        })
        .await?;
    Ok(Json(RefundResponse::from(&refund)))
}

/// POST /api/admin/reconcile - Re-verify stale PENDING and re-dispatch PAID
pub async fn reconcile(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    request: Option<Json<ReconcileRequest>>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let Json(request) = request.unwrap_or_default();
    let defaults = ReconcilePaymentsCommand::default();
    let cmd = ReconcilePaymentsCommand {
        pending_older_than_secs: request
            .pending_older_than_secs
            .unwrap_or(defaults.pending_older_than_secs),
        limit: request.limit.unwrap_or(defaults.limit),
    };

    let report = state.reconcile_handler().handle(cmd).await?;
    Ok(Json(report))
}

/// POST /api/admin/dispatch/:reference - Re-run side effects of a PAID payment
pub async fn retry_dispatch(
    State(state): State<SettlementAppState>,
    _admin: AdminUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, SettlementApiError> {
    let status = state
        .retry_dispatch_handler()
        .handle(RetryDispatchCommand {
            reference: reference.clone(),
        })
        .await?;
    Ok(Json(DispatchResponse {
        reference,
        dispatch: dispatch_label(&status),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/paystack - Signed gateway notifications
pub async fn paystack_webhook(
    State(state): State<SettlementAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, SettlementApiError> {
    let signature = headers
        .get(PAYSTACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SettlementError::Forbidden("missing webhook signature".to_string()))?;

    let cmd = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let outcome = match state.webhook_handler().handle(cmd).await? {
        HandleGatewayWebhookResult::Ignored(_) => "ignored",
        _ => "processed",
    };

    Ok(Json(serde_json::json!({ "status": outcome })))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts settlement errors to HTTP responses.
#[derive(Debug)]
pub struct SettlementApiError(pub SettlementError);

impl From<SettlementError> for SettlementApiError {
    fn from(err: SettlementError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::DomainError> for SettlementApiError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        Self(SettlementError::from(err))
    }
}

impl From<ValidationError> for SettlementApiError {
    fn from(err: ValidationError) -> Self {
        Self(SettlementError::from(err))
    }
}

impl SettlementApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            SettlementError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            SettlementError::RefundNotFound(_) => (StatusCode::NOT_FOUND, "REFUND_NOT_FOUND"),
            SettlementError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            SettlementError::NotRefundable { .. } => (StatusCode::CONFLICT, "NOT_REFUNDABLE"),
            SettlementError::InvalidState { .. } => {
                (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
            }
            SettlementError::RefundInProgress { .. } => {
                (StatusCode::CONFLICT, "REFUND_IN_PROGRESS")
            }
            SettlementError::AmountMismatch { .. } => (StatusCode::CONFLICT, "AMOUNT_MISMATCH"),
            SettlementError::InvalidRefundAmount { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_REFUND_AMOUNT")
            }
            SettlementError::ValidationFailed { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
            }
            SettlementError::GatewayRejected(_) => (StatusCode::PAYMENT_REQUIRED, "GATEWAY_REJECTED"),
            SettlementError::RefundRejected(_) => (StatusCode::PAYMENT_REQUIRED, "REFUND_REJECTED"),
            SettlementError::GatewayUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNAVAILABLE")
            }
            SettlementError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            SettlementError::DispatchFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DISPATCH_FAILED")
            }
            SettlementError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for SettlementApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code, "Request failed");
        }

        let body = ErrorResponse::new(code, self.0.user_message()).retryable(self.0.is_retryable());
        (status, Json(body)).into_response()
    }
}
