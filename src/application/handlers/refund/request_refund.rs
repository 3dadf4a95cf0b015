//! RequestRefundHandler - Opens a refund and submits it to the gateway.

use std::sync::Arc;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::SettlementError;
use crate::domain::refund::{Refund, RefundStatus, RefundTransition};
use crate::ports::{
    GatewayError, GatewayErrorCode, InsertRefundResult, PaymentGateway, PaymentLedger,
    RefundChargeRequest, RefundOutcome, RefundRepository,
};

#[derive(Debug, Clone)]
pub struct RequestRefundCommand {
    pub payment_id: PaymentId,
    pub reason: String,

    /// Minor units; the full payment amount when absent.
    pub amount: Option<i64>,

    pub admin_notes: Option<String>,
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestRefundResult {
    /// PROCESSING when the provider accepted, MANUAL_REVIEW when the outcome
    /// is unknown or there is nothing to submit.
    pub refund: Refund,
}

/// Handler for refund requests.
///
/// The payment stays PAID throughout; only a completed refund moves it to
/// REFUNDED.
pub struct RequestRefundHandler {
    ledger: Arc<dyn PaymentLedger>,
    refunds: Arc<dyn RefundRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl RequestRefundHandler {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        refunds: Arc<dyn RefundRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            ledger,
            refunds,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: RequestRefundCommand,
    ) -> Result<RequestRefundResult, SettlementError> {
        // 1. Payment must exist and be PAID
        let payment = self
            .ledger
            .find_by_id(&cmd.payment_id)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(cmd.payment_id.to_string()))?;
        if !payment.is_paid() {
            return Err(SettlementError::NotRefundable {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        // 2. One open refund per payment
        if let Some(open) = self.refunds.find_open_for_payment(&payment.id).await? {
            return Err(SettlementError::RefundInProgress {
                payment_id: payment.id,
                refund_id: open.id,
            });
        }

        // 3. Validate amount and build the PENDING refund
        let refund = Refund::request(
            &payment,
            cmd.reason,
            cmd.amount,
            cmd.admin_notes,
            cmd.requested_by,
        )?;

        // 4. Insert; the store re-checks the open-refund guard atomically
        if let InsertRefundResult::OpenRefundExists(refund_id) =
            self.refunds.insert_if_no_open(&refund).await?
        {
            return Err(SettlementError::RefundInProgress {
                payment_id: payment.id,
                refund_id,
            });
        }

        tracing::info!(
            refund_id = %refund.id,
            reference = %payment.reference,
            amount = refund.amount.minor_units(),
            "Refund requested"
        );

        // 5. Submit to the gateway, or park for review when there is nothing to submit
        let Some(transaction_id) = payment.provider_transaction_id.clone() else {
            let refund = self
                .transition(
                    &refund,
                    RefundTransition::manual_review("No provider transaction to refund"),
                )
                .await?;
            return Ok(RequestRefundResult { refund });
        };

        let submitted = self
            .gateway
            .refund(RefundChargeRequest {
                provider_transaction_id: transaction_id,
                amount: refund.amount.minor_units(),
                reason: refund.reason.clone(),
            })
            .await;

        match submitted {
            Ok(RefundOutcome {
                accepted: true,
                provider_refund_reference,
                ..
            }) => {
                let refund = self
                    .transition(&refund, RefundTransition::processing(provider_refund_reference))
                    .await?;
                Ok(RequestRefundResult { refund })
            }
            Ok(RefundOutcome {
                accepted: false,
                message,
                ..
            })
            | Err(GatewayError {
                code: GatewayErrorCode::Rejected,
                message,
                ..
            }) => {
                tracing::warn!(
                    refund_id = %refund.id,
                    reference = %payment.reference,
                    message = %message,
                    "Provider rejected refund"
                );
                let failed = RefundTransition::fail(RefundStatus::Pending, message.clone())?;
                self.transition(&refund, failed).await?;
                Err(SettlementError::RefundRejected(message))
            }
            Err(e) => {
                tracing::warn!(
                    refund_id = %refund.id,
                    reference = %payment.reference,
                    error = %e,
                    "Refund outcome unknown; sent to manual review"
                );
                let refund = self
                    .transition(
                        &refund,
                        RefundTransition::manual_review(format!(
                            "Provider outcome unknown: {}",
                            e.message
                        )),
                    )
                    .await?;
                Ok(RequestRefundResult { refund })
            }
        }
    }

    async fn transition(
        &self,
        refund: &Refund,
        transition: RefundTransition,
    ) -> Result<Refund, SettlementError> {
        Ok(self
            .refunds
            .apply_transition(&refund.id, &transition)
            .await?
            .into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentLedger, InMemoryRefundRepository};
    use crate::adapters::paystack::MockPaymentGateway;
    use crate::domain::foundation::{Amount, CourseId, Timestamp, UserId};
    use crate::domain::payment::{
        Payment, PaymentReference, PaymentStatus, PaymentTransition, PaymentType,
    };

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        handler: RequestRefundHandler,
        ledger: Arc<InMemoryPaymentLedger>,
        refunds: Arc<InMemoryRefundRepository>,
        gateway: MockPaymentGateway,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let gateway = MockPaymentGateway::new();
        let handler =
            RequestRefundHandler::new(ledger.clone(), refunds.clone(), Arc::new(gateway.clone()));
        Fixture {
            handler,
            ledger,
            refunds,
            gateway,
        }
    }

    async fn paid_payment(ledger: &InMemoryPaymentLedger, tx: Option<&str>) -> Payment {
        let payment = Payment::pending(
            PaymentReference::new("KM_1").unwrap(),
            PaymentType::Tuition,
            Amount::new(50_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            Some(CourseId::new("course-1").unwrap()),
        )
        .unwrap();
        ledger.insert(&payment).await.unwrap();
        ledger
            .apply_transition(
                &payment.id,
                &PaymentTransition::settle(tx.map(String::from), Timestamp::now()),
            )
            .await
            .unwrap()
            .into_inner()
    }

    fn command(payment: &Payment, amount: Option<i64>) -> RequestRefundCommand {
        RequestRefundCommand {
            payment_id: payment.id,
            reason: "Course withdrawn".into(),
            amount,
            admin_notes: None,
            requested_by: Some("admin-1".into()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Provider Outcomes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn accepted_refund_is_processing() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;

        let result = f.handler.handle(command(&payment, Some(20_000))).await.unwrap();

        assert_eq!(result.refund.status, RefundStatus::Processing);
        assert_eq!(result.refund.amount.minor_units(), 20_000);
        assert_eq!(result.refund.provider_refund_reference.as_deref(), Some("rf_mock_1"));
        let sent = f.gateway.refund_requests();
        assert_eq!(sent[0].provider_transaction_id, "tx_1");
        assert_eq!(sent[0].amount, 20_000);

        let stored = f.ledger.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn omitted_amount_refunds_in_full() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;

        let result = f.handler.handle(command(&payment, None)).await.unwrap();
        assert!(result.refund.is_full(&payment));
    }

    #[tokio::test]
    async fn provider_rejection_fails_refund_with_provider_text() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        f.gateway.set_refund_result(Ok(RefundOutcome {
            accepted: false,
            provider_refund_reference: None,
            message: "Transaction has been fully reversed".into(),
        }));

        let err = f.handler.handle(command(&payment, None)).await.unwrap_err();

        assert_eq!(
            err,
            SettlementError::RefundRejected("Transaction has been fully reversed".into())
        );
        let refunds = f.refunds.list_for_payment(&payment.id).await.unwrap();
        assert_eq!(refunds[0].status, RefundStatus::Failed);
        assert_eq!(
            refunds[0].failure_reason.as_deref(),
            Some("Transaction has been fully reversed")
        );
    }

    #[tokio::test]
    async fn rejected_error_is_treated_as_rejection() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        f.gateway
            .set_refund_result(Err(GatewayError::rejected("Refund amount too large")));

        let err = f.handler.handle(command(&payment, None)).await.unwrap_err();
        assert!(matches!(err, SettlementError::RefundRejected(_)));
    }

    #[tokio::test]
    async fn unavailable_gateway_sends_refund_to_review() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        f.gateway
            .set_refund_result(Err(GatewayError::unavailable("read timeout")));

        let result = f.handler.handle(command(&payment, None)).await.unwrap();

        assert_eq!(result.refund.status, RefundStatus::ManualReview);
        assert!(result.refund.admin_notes.unwrap().contains("read timeout"));
    }

    #[tokio::test]
    async fn payment_without_transaction_goes_to_review() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, None).await;

        let result = f.handler.handle(command(&payment, None)).await.unwrap();

        assert_eq!(result.refund.status, RefundStatus::ManualReview);
        assert!(f.gateway.refund_requests().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Validation
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn pending_payment_is_not_refundable() {
        let f = fixture();
        let payment = Payment::pending(
            PaymentReference::new("KM_2").unwrap(),
            PaymentType::ApplicationFee,
            Amount::new(5_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            None,
        )
        .unwrap();
        f.ledger.insert(&payment).await.unwrap();

        let err = f.handler.handle(command(&payment, None)).await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::NotRefundable {
                status: PaymentStatus::Pending,
                ..
            }
        ));
        assert!(f.refunds.is_empty());
    }

    #[tokio::test]
    async fn refunded_payment_is_not_refundable() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        f.ledger
            .apply_transition(&payment.id, &PaymentTransition::refund())
            .await
            .unwrap();

        let err = f.handler.handle(command(&payment, None)).await.unwrap_err();

        assert_eq!(
            err,
            SettlementError::NotRefundable {
                payment_id: payment.id,
                status: PaymentStatus::Refunded,
            }
        );
        assert!(f.refunds.is_empty());
        assert!(f.gateway.refund_requests().is_empty());
    }

    #[tokio::test]
    async fn amount_outside_bounds_is_invalid() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;

        for amount in [0, -5, 50_001] {
            let err = f
                .handler
                .handle(command(&payment, Some(amount)))
                .await
                .unwrap_err();
            assert!(matches!(err, SettlementError::InvalidRefundAmount { max: 50_000, .. }));
        }
        assert!(f.refunds.is_empty());
    }

    #[tokio::test]
    async fn second_refund_while_one_is_open_is_rejected() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        let first = f.handler.handle(command(&payment, Some(10_000))).await.unwrap();

        let err = f
            .handler
            .handle(command(&payment, Some(10_000)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SettlementError::RefundInProgress {
                payment_id: payment.id,
                refund_id: first.refund.id
            }
        );
        assert_eq!(f.refunds.len(), 1);
    }

    #[tokio::test]
    async fn new_refund_allowed_after_rejection() {
        let f = fixture();
        let payment = paid_payment(&f.ledger, Some("tx_1")).await;
        f.gateway
            .set_refund_result(Err(GatewayError::rejected("Try again later")));
        assert!(f.handler.handle(command(&payment, None)).await.is_err());

        f.gateway.set_refund_result(Ok(RefundOutcome {
            accepted: true,
            provider_refund_reference: Some("rf_2".into()),
            message: "queued".into(),
        }));
        let result = f.handler.handle(command(&payment, None)).await.unwrap();
        assert_eq!(result.refund.status, RefundStatus::Processing);
    }
}
