//! CompleteRefundHandler - Marks a refund COMPLETED and the payment REFUNDED.

use std::sync::Arc;

use crate::domain::foundation::RefundId;
use crate::domain::payment::{PaymentStatus, PaymentTransition, SettlementError};
use crate::domain::refund::{Refund, RefundStatus, RefundTransition};
use crate::ports::{PaymentLedger, RefundRepository, TransitionOutcome};

#[derive(Debug, Clone)]
pub struct CompleteRefundCommand {
    pub refund_id: RefundId,
}

#[derive(Debug, Clone)]
pub struct CompleteRefundResult {
    pub refund: Refund,
    pub payment_status: PaymentStatus,

    /// True when this call moved the payment PAID -> REFUNDED.
    pub payment_refunded: bool,
}

/// Handler for refund completion.
///
/// Idempotent. Calling it again on a COMPLETED refund re-attempts the
/// payment transition, which repairs a payment left PAID by an interrupted
/// earlier call.
pub struct CompleteRefundHandler {
    ledger: Arc<dyn PaymentLedger>,
    refunds: Arc<dyn RefundRepository>,
}

impl CompleteRefundHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>, refunds: Arc<dyn RefundRepository>) -> Self {
        Self { ledger, refunds }
    }

    pub async fn handle(
        &self,
        cmd: CompleteRefundCommand,
    ) -> Result<CompleteRefundResult, SettlementError> {
        // 1. Load refund
        let refund = self
            .refunds
            .find_by_id(&cmd.refund_id)
            .await?
            .ok_or(SettlementError::RefundNotFound(cmd.refund_id))?;

        // 2. CAS to COMPLETED unless already there
        let refund = match refund.status {
            RefundStatus::Completed => refund,
            status if status.is_completable() => {
                let transition = RefundTransition::complete(status)?;
                match self.refunds.apply_transition(&refund.id, &transition).await? {
                    TransitionOutcome::Applied(done) => {
                        tracing::info!(
                            refund_id = %done.id,
                            payment_id = %done.payment_id,
                            amount = done.amount.minor_units(),
                            "Refund completed"
                        );
                        done
                    }
                    TransitionOutcome::Stale { current } if current.status == RefundStatus::Completed => {
                        current
                    }
                    TransitionOutcome::Stale { current } => {
                        return Err(SettlementError::invalid_state(
                            current.status.as_str(),
                            "complete refund",
                        ))
                    }
                }
            }
            status => {
                return Err(SettlementError::invalid_state(
                    status.as_str(),
                    "complete refund",
                ))
            }
        };

        // 3. CAS payment PAID -> REFUNDED
        let outcome = self
            .ledger
            .apply_transition(&refund.payment_id, &PaymentTransition::refund())
            .await?;
        let payment_refunded = outcome.was_applied();
        let payment = outcome.into_inner();

        if payment_refunded {
            tracing::info!(
                reference = %payment.reference,
                refund_id = %refund.id,
                "Payment refunded"
            );
            if let Some(enrollment_id) = &payment.enrollment_id {
                tracing::warn!(
                    reference = %payment.reference,
                    enrollment_id = %enrollment_id,
                    "Refunded payment had granted an enrollment; enrollment left in place"
                );
            }
        } else if payment.status != PaymentStatus::Refunded {
            tracing::error!(
                reference = %payment.reference,
                status = %payment.status,
                refund_id = %refund.id,
                "Completed refund against a payment that is not PAID"
            );
        }

        Ok(CompleteRefundResult {
            refund,
            payment_status: payment.status,
            payment_refunded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentLedger, InMemoryRefundRepository};
    use crate::domain::foundation::{Amount, CourseId, Timestamp, UserId};
    use crate::domain::payment::{Payment, PaymentReference, PaymentType};
    use crate::ports::InsertRefundResult;

    struct Fixture {
        handler: CompleteRefundHandler,
        ledger: Arc<InMemoryPaymentLedger>,
        refunds: Arc<InMemoryRefundRepository>,
        payment: Payment,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let refunds = Arc::new(InMemoryRefundRepository::new());
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
        let payment = ledger
            .apply_transition(
                &payment.id,
                &PaymentTransition::settle(Some("tx_1".into()), Timestamp::now()),
            )
            .await
            .unwrap()
            .into_inner();

        Fixture {
            handler: CompleteRefundHandler::new(ledger.clone(), refunds.clone()),
            ledger,
            refunds,
            payment,
        }
    }

    async fn open_refund(f: &Fixture, transition: RefundTransition) -> Refund {
        let refund = Refund::request(&f.payment, "Withdrawn", Some(20_000), None, None).unwrap();
        assert_eq!(
            f.refunds.insert_if_no_open(&refund).await.unwrap(),
            InsertRefundResult::Inserted
        );
        f.refunds
            .apply_transition(&refund.id, &transition)
            .await
            .unwrap()
            .into_inner()
    }

    fn complete(refund: &Refund) -> CompleteRefundCommand {
        CompleteRefundCommand {
            refund_id: refund.id,
        }
    }

    #[tokio::test]
    async fn processing_refund_completes_and_refunds_payment() {
        let f = fixture().await;
        let refund = open_refund(&f, RefundTransition::processing(Some("rf_1".into()))).await;

        let result = f.handler.handle(complete(&refund)).await.unwrap();

        assert_eq!(result.refund.status, RefundStatus::Completed);
        assert!(result.refund.completed_at.is_some());
        assert!(result.payment_refunded);
        assert_eq!(result.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn repeated_completion_is_a_no_op() {
        let f = fixture().await;
        let refund = open_refund(&f, RefundTransition::processing(None)).await;

        let first = f.handler.handle(complete(&refund)).await.unwrap();
        let second = f.handler.handle(complete(&refund)).await.unwrap();

        assert!(first.payment_refunded);
        assert!(!second.payment_refunded);
        assert_eq!(second.payment_status, PaymentStatus::Refunded);
        assert_eq!(second.refund.completed_at, first.refund.completed_at);
    }

    #[tokio::test]
    async fn repeat_call_repairs_payment_left_paid() {
        let f = fixture().await;
        let refund = open_refund(&f, RefundTransition::processing(None)).await;
        // Simulate a crash between the two writes.
        f.refunds
            .apply_transition(&refund.id, &RefundTransition::complete(RefundStatus::Processing).unwrap())
            .await
            .unwrap();

        let result = f.handler.handle(complete(&refund)).await.unwrap();

        assert!(result.payment_refunded);
        let stored = f.ledger.find_by_id(&f.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn approved_refund_can_complete() {
        let f = fixture().await;
        let refund = open_refund(&f, RefundTransition::manual_review("no tx")).await;
        f.refunds
            .apply_transition(&refund.id, &RefundTransition::approve(Some("ok".into())))
            .await
            .unwrap();

        let result = f.handler.handle(complete(&refund)).await.unwrap();
        assert_eq!(result.refund.status, RefundStatus::Completed);
    }

    #[tokio::test]
    async fn refund_under_review_cannot_complete() {
        let f = fixture().await;
        let refund = open_refund(&f, RefundTransition::manual_review("no tx")).await;

        let err = f.handler.handle(complete(&refund)).await.unwrap_err();

        assert!(matches!(err, SettlementError::InvalidState { .. }));
        let stored = f.ledger.find_by_id(&f.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_refund_is_not_found() {
        let f = fixture().await;
        let err = f
            .handler
            .handle(CompleteRefundCommand {
                refund_id: RefundId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::RefundNotFound(_)));
    }
}
