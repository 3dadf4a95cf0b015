//! FailRefundHandler - Records that the provider could not return the money.

use std::sync::Arc;

use crate::domain::foundation::RefundId;
use crate::domain::payment::SettlementError;
use crate::domain::refund::{Refund, RefundStatus, RefundTransition};
use crate::ports::{RefundRepository, TransitionOutcome};

#[derive(Debug, Clone)]
pub struct FailRefundCommand {
    pub refund_id: RefundId,
    pub reason: String,
}

/// Handler for failed refunds (PENDING or PROCESSING -> FAILED).
///
/// Repeat calls on a FAILED refund return it unchanged. The payment stays
/// PAID, so a fresh refund may be requested.
pub struct FailRefundHandler {
    refunds: Arc<dyn RefundRepository>,
}

impl FailRefundHandler {
    pub fn new(refunds: Arc<dyn RefundRepository>) -> Self {
        Self { refunds }
    }

    pub async fn handle(&self, cmd: FailRefundCommand) -> Result<Refund, SettlementError> {
        let refund = self
            .refunds
            .find_by_id(&cmd.refund_id)
            .await?
            .ok_or(SettlementError::RefundNotFound(cmd.refund_id))?;

        match refund.status {
            RefundStatus::Failed => Ok(refund),
            status @ (RefundStatus::Pending | RefundStatus::Processing) => {
                let transition = RefundTransition::fail(status, cmd.reason)?;
                match self.refunds.apply_transition(&refund.id, &transition).await? {
                    TransitionOutcome::Applied(failed) => {
                        tracing::warn!(
                            refund_id = %failed.id,
                            payment_id = %failed.payment_id,
                            reason = ?failed.failure_reason,
                            "Refund failed"
                        );
                        Ok(failed)
                    }
                    TransitionOutcome::Stale { current } if current.status == RefundStatus::Failed => {
                        Ok(current)
                    }
                    TransitionOutcome::Stale { current } => Err(SettlementError::invalid_state(
                        current.status.as_str(),
                        "fail refund",
                    )),
                }
            }
            status => Err(SettlementError::invalid_state(status.as_str(), "fail refund")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRefundRepository;
    use crate::domain::foundation::{Amount, Timestamp, UserId};
    use crate::domain::payment::{Payment, PaymentReference, PaymentTransition, PaymentType};

    async fn processing_refund(refunds: &InMemoryRefundRepository) -> Refund {
        let payment = Payment::pending(
            PaymentReference::new("KM_1").unwrap(),
            PaymentType::ApplicationFee,
            Amount::new(5_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            None,
        )
        .unwrap();
        let payment = PaymentTransition::settle(Some("tx".into()), Timestamp::now()).apply_to(&payment);
        let refund = Refund::request(&payment, "Duplicate charge", None, None, None).unwrap();
        refunds.insert_if_no_open(&refund).await.unwrap();
        refunds
            .apply_transition(&refund.id, &RefundTransition::processing(Some("rf_1".into())))
            .await
            .unwrap()
            .into_inner()
    }

    fn fail(refund: &Refund) -> FailRefundCommand {
        FailRefundCommand {
            refund_id: refund.id,
            reason: "Customer bank closed".into(),
        }
    }

    #[tokio::test]
    async fn processing_refund_fails_with_reason() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = processing_refund(&refunds).await;
        let handler = FailRefundHandler::new(refunds);

        let failed = handler.handle(fail(&refund)).await.unwrap();

        assert_eq!(failed.status, RefundStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("Customer bank closed"));
    }

    #[tokio::test]
    async fn failing_twice_is_a_no_op() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = processing_refund(&refunds).await;
        let handler = FailRefundHandler::new(refunds);

        let first = handler.handle(fail(&refund)).await.unwrap();
        let second = handler.handle(fail(&refund)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn completed_refund_cannot_fail() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = processing_refund(&refunds).await;
        refunds
            .apply_transition(&refund.id, &RefundTransition::complete(RefundStatus::Processing).unwrap())
            .await
            .unwrap();

        let err = FailRefundHandler::new(refunds)
            .handle(fail(&refund))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidState { .. }));
    }
}
