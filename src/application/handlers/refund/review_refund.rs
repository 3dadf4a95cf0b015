//! Manual review decisions on refunds parked in MANUAL_REVIEW.

use std::sync::Arc;

use crate::domain::foundation::RefundId;
use crate::domain::payment::SettlementError;
use crate::domain::refund::{Refund, RefundTransition};
use crate::ports::{RefundRepository, TransitionOutcome};

#[derive(Debug, Clone)]
pub struct ApproveRefundCommand {
    pub refund_id: RefundId,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RejectRefundCommand {
    pub refund_id: RefundId,
    pub reason: String,
}

/// Approves a refund under review. The money still has to be returned
/// off-gateway; `complete_refund` records that it was.
pub struct ApproveRefundHandler {
    refunds: Arc<dyn RefundRepository>,
}

impl ApproveRefundHandler {
    pub fn new(refunds: Arc<dyn RefundRepository>) -> Self {
        Self { refunds }
    }

    pub async fn handle(&self, cmd: ApproveRefundCommand) -> Result<Refund, SettlementError> {
        let refund = review(
            self.refunds.as_ref(),
            &cmd.refund_id,
            RefundTransition::approve(cmd.admin_notes),
            "approve refund",
        )
        .await?;
        tracing::info!(refund_id = %refund.id, "Refund approved");
        Ok(refund)
    }
}

/// Rejects a refund under review. The payment stays PAID.
pub struct RejectRefundHandler {
    refunds: Arc<dyn RefundRepository>,
}

impl RejectRefundHandler {
    pub fn new(refunds: Arc<dyn RefundRepository>) -> Self {
        Self { refunds }
    }

    pub async fn handle(&self, cmd: RejectRefundCommand) -> Result<Refund, SettlementError> {
        if cmd.reason.trim().is_empty() {
            return Err(SettlementError::validation("reason", "Rejection reason is required"));
        }
        let refund = review(
            self.refunds.as_ref(),
            &cmd.refund_id,
            RefundTransition::reject(cmd.reason),
            "reject refund",
        )
        .await?;
        tracing::info!(refund_id = %refund.id, "Refund rejected");
        Ok(refund)
    }
}

async fn review(
    refunds: &dyn RefundRepository,
    refund_id: &RefundId,
    transition: RefundTransition,
    attempted: &str,
) -> Result<Refund, SettlementError> {
    let refund = refunds
        .find_by_id(refund_id)
        .await?
        .ok_or(SettlementError::RefundNotFound(*refund_id))?;

    if refund.status != transition.from {
        return Err(SettlementError::invalid_state(refund.status.as_str(), attempted));
    }

    match refunds.apply_transition(&refund.id, &transition).await? {
        TransitionOutcome::Applied(refund) => Ok(refund),
        TransitionOutcome::Stale { current } => Err(SettlementError::invalid_state(
            current.status.as_str(),
            attempted,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRefundRepository;
    use crate::domain::foundation::{Amount, Timestamp, UserId};
    use crate::domain::payment::{Payment, PaymentReference, PaymentTransition, PaymentType};
    use crate::domain::refund::RefundStatus;

    async fn refund_in(
        refunds: &InMemoryRefundRepository,
        transition: Option<RefundTransition>,
    ) -> Refund {
        let payment = Payment::pending(
            PaymentReference::new("KM_1").unwrap(),
            PaymentType::ApplicationFee,
            Amount::new(5_000).unwrap(),
            "NGN",
            UserId::new("user-1").unwrap(),
            None,
        )
        .unwrap();
        let payment = PaymentTransition::settle(None, Timestamp::now()).apply_to(&payment);
        let refund = Refund::request(&payment, "Duplicate charge", None, None, None).unwrap();
        refunds.insert_if_no_open(&refund).await.unwrap();
        match transition {
            Some(t) => refunds
                .apply_transition(&refund.id, &t)
                .await
                .unwrap()
                .into_inner(),
            None => refund,
        }
    }

    #[tokio::test]
    async fn approve_moves_review_to_approved() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = refund_in(&refunds, Some(RefundTransition::manual_review("no tx"))).await;

        let approved = ApproveRefundHandler::new(refunds)
            .handle(ApproveRefundCommand {
                refund_id: refund.id,
                admin_notes: Some("Bank transfer sent".into()),
            })
            .await
            .unwrap();

        assert_eq!(approved.status, RefundStatus::Approved);
        assert_eq!(approved.admin_notes.as_deref(), Some("Bank transfer sent"));
        assert!(approved.processed_at.is_some());
    }

    #[tokio::test]
    async fn reject_records_reason() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = refund_in(&refunds, Some(RefundTransition::manual_review("no tx"))).await;

        let rejected = RejectRefundHandler::new(refunds.clone())
            .handle(RejectRefundCommand {
                refund_id: refund.id,
                reason: "Outside refund window".into(),
            })
            .await
            .unwrap();

        assert_eq!(rejected.status, RefundStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Outside refund window"));
        assert!(refunds.list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_refunds_under_review_can_be_decided() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = refund_in(&refunds, None).await;

        let err = ApproveRefundHandler::new(refunds)
            .handle(ApproveRefundCommand {
                refund_id: refund.id,
                admin_notes: None,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SettlementError::invalid_state("PENDING", "approve refund")
        );
    }

    #[tokio::test]
    async fn blank_rejection_reason_is_invalid() {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let refund = refund_in(&refunds, Some(RefundTransition::manual_review("no tx"))).await;

        let err = RejectRefundHandler::new(refunds)
            .handle(RejectRefundCommand {
                refund_id: refund.id,
                reason: "  ".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::ValidationFailed { .. }));
    }
}
