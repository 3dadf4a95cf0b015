//! Axum router configuration for the settlement endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    approve_refund, charge_installment, complete_refund, create_installment_plan, fail_refund,
    initialize_payment, payment_history, payment_refunds, paystack_webhook, pending_payments,
    pending_refunds, reconcile, reject_refund, request_refund, retry_dispatch, verify_payment,
    SettlementAppState,
};

/// Payer routes (require `X-User-Id`).
///
/// - `POST /payments` - Create a payment and start checkout
/// - `GET /payments` - Payment history (`?status=PENDING` to filter)
/// - `GET /payments/pending` - Outstanding charges
/// - `POST /payments/:reference/verify` - Confirm and settle
/// - `POST /installment-plans` - Create an installment plan
/// - `POST /installments/:payment_id/charge` - Checkout for one slice
pub fn payment_routes() -> Router<SettlementAppState> {
    Router::new()
        .route("/payments", post(initialize_payment).get(payment_history))
        .route("/payments/pending", get(pending_payments))
        .route("/payments/:reference/verify", post(verify_payment))
        .route("/installment-plans", post(create_installment_plan))
        .route("/installments/:payment_id/charge", post(charge_installment))
}

/// Finance staff routes (require `X-User-Role: admin`).
///
/// - `POST /payments/:payment_id/refunds` - Request a refund
/// - `GET /payments/:payment_id/refunds` - Refunds of one payment
/// - `GET /refunds` - Open refunds
/// - `POST /refunds/:refund_id/{approve,reject,complete,fail}` - Resolve a refund
/// - `POST /reconcile` - Sweep stale PENDING and undispatched PAID payments
/// - `POST /dispatch/:reference` - Re-run side effects for one payment
pub fn admin_routes() -> Router<SettlementAppState> {
    Router::new()
        .route(
            "/payments/:payment_id/refunds",
            post(request_refund).get(payment_refunds),
        )
        .route("/refunds", get(pending_refunds))
        .route("/refunds/:refund_id/approve", post(approve_refund))
        .route("/refunds/:refund_id/reject", post(reject_refund))
        .route("/refunds/:refund_id/complete", post(complete_refund))
        .route("/refunds/:refund_id/fail", post(fail_refund))
        .route("/reconcile", post(reconcile))
        .route("/dispatch/:reference", post(retry_dispatch))
}

/// Gateway webhooks (no caller headers, signature verified).
pub fn webhook_routes() -> Router<SettlementAppState> {
    Router::new().route("/paystack", post(paystack_webhook))
}

/// Complete settlement router, mounted under `/api`.
pub fn settlement_router() -> Router<SettlementAppState> {
    Router::new()
        .merge(payment_routes())
        .nest("/admin", admin_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::adapters::memory::{
        InMemoryApplicationStore, InMemoryEnrollmentStore, InMemoryPaymentLedger,
        InMemoryRefundRepository, InMemoryUserDirectory,
    };
    use crate::adapters::paystack::{MockPaymentGateway, MOCK_WEBHOOK_SIGNATURE};
    use crate::application::handlers::CheckoutSettings;
    use crate::application::SideEffectDispatcher;
    use crate::domain::foundation::UserId;

    fn app() -> Router {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        users.add_user(&UserId::new("user-1").unwrap(), "ada@example.edu");
        let state = SettlementAppState {
            ledger: ledger.clone(),
            refunds: Arc::new(InMemoryRefundRepository::new()),
            gateway: Arc::new(MockPaymentGateway::new()),
            users,
            dispatcher: SideEffectDispatcher::standard(
                ledger,
                Arc::new(InMemoryEnrollmentStore::new()),
                Arc::new(InMemoryApplicationStore::new()),
            ),
            checkout: CheckoutSettings::default(),
        };
        Router::new().nest("/api", settlement_router()).with_state(state)
    }

    fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn initialize_payment_returns_created() {
        let response = app()
            .oneshot(request(
                "POST",
                "/api/payments",
                &[("X-User-Id", "user-1")],
                r#"{"payment_type":"TUITION","amount":50000,"course_id":"course-1","reference":"KM_1"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn payer_routes_require_user_header() {
        let response = app()
            .oneshot(request("GET", "/api/payments", &[], ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_refuse_students() {
        let response = app()
            .oneshot(request(
                "GET",
                "/api/admin/refunds",
                &[("X-User-Id", "user-1"), ("X-User-Role", "student")],
                "",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_can_list_open_refunds() {
        let response = app()
            .oneshot(request(
                "GET",
                "/api/admin/refunds",
                &[("X-User-Id", "ops-1"), ("X-User-Role", "admin")],
                "",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_payment_verify_is_not_found() {
        let response = app()
            .oneshot(request(
                "POST",
                "/api/payments/KM_missing/verify",
                &[("X-User-Id", "user-1")],
                "",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_webhook_is_acknowledged() {
        let response = app()
            .oneshot(request(
                "POST",
                "/api/webhooks/paystack",
                &[("x-paystack-signature", MOCK_WEBHOOK_SIGNATURE)],
                r#"{"event":"transfer.success","data":{}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
