use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::payment::Payment;
use crate::ports::PaymentLedger;

use super::{DispatchError, EffectOutcome, SettlementEffect, TuitionEffect};

/// INSTALLMENT: enroll once every slice of the group is PAID.
///
/// Progress is read from the ledger on every call so concurrent slice
/// settlements each see the committed state.
pub struct InstallmentEffect {
    ledger: Arc<dyn PaymentLedger>,
    enroll: Arc<TuitionEffect>,
}

impl InstallmentEffect {
    pub fn new(ledger: Arc<dyn PaymentLedger>, enroll: Arc<TuitionEffect>) -> Self {
        Self { ledger, enroll }
    }
}

#[async_trait]
impl SettlementEffect for InstallmentEffect {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome, DispatchError> {
        let course_id = payment
            .course_id
            .as_ref()
            .ok_or_else(|| DispatchError::MissingCourse(payment.reference.clone()))?;

        let progress = self
            .ledger
            .installment_progress(&payment.user_id, course_id)
            .await?;

        if !progress.is_fully_paid() {
            tracing::debug!(
                reference = %payment.reference,
                paid = progress.paid,
                total = progress.total,
                "Installment group not yet complete"
            );
            return Ok(EffectOutcome::InstallmentsOutstanding {
                paid: progress.paid,
                total: progress.total,
            });
        }

        self.enroll.apply(payment).await
    }
}
