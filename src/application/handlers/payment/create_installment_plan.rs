//! CreateInstallmentPlanHandler - Splits a course fee into PENDING installments.

use std::sync::Arc;

use serde_json::json;

use crate::domain::foundation::{Amount, CourseId, Timestamp, UserId};
use crate::domain::payment::{
    schedule_installments, Payment, PaymentReference, PaymentType, SettlementError,
};
use crate::ports::PaymentLedger;

use super::CheckoutSettings;

/// Days between due dates when the caller gives none.
pub const DEFAULT_INTERVAL_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct CreateInstallmentPlanCommand {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub total_amount: i64,
    pub installments: u32,
    pub first_due_date: Option<Timestamp>,
    pub interval_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CreateInstallmentPlanResult {
    /// Slices in sequence order.
    pub payments: Vec<Payment>,
}

/// Handler for creating installment plans.
///
/// A user holds at most one plan per course. Slices that FAILED do not count,
/// so a plan whose every slice failed may be replaced.
pub struct CreateInstallmentPlanHandler {
    ledger: Arc<dyn PaymentLedger>,
    settings: CheckoutSettings,
}

impl CreateInstallmentPlanHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>, settings: CheckoutSettings) -> Self {
        Self { ledger, settings }
    }

    pub async fn handle(
        &self,
        cmd: CreateInstallmentPlanCommand,
    ) -> Result<CreateInstallmentPlanResult, SettlementError> {
        // 1. Reject a second plan for the same course
        let progress = self
            .ledger
            .installment_progress(&cmd.user_id, &cmd.course_id)
            .await?;
        if progress.total > 0 {
            return Err(SettlementError::invalid_state(
                format!("installment plan {}/{} paid", progress.paid, progress.total),
                "create another installment plan",
            ));
        }

        // 2. Schedule slices
        let total = Amount::new(cmd.total_amount)?;
        let slices = schedule_installments(
            total,
            cmd.installments,
            cmd.first_due_date.unwrap_or_else(Timestamp::now),
            cmd.interval_days.unwrap_or(DEFAULT_INTERVAL_DAYS),
        )?;

        // 3. Build one PENDING payment per slice
        let payments = slices
            .iter()
            .map(|slice| {
                Payment::pending(
                    PaymentReference::generate(&self.settings.reference_prefix),
                    PaymentType::Installment,
                    slice.amount,
                    &self.settings.currency,
                    cmd.user_id.clone(),
                    Some(cmd.course_id.clone()),
                )
                .map(|p| {
                    p.with_due_date(slice.due_date).with_metadata(json!({
                        "payment_type": PaymentType::Installment.as_str(),
                        "user_id": cmd.user_id.as_str(),
                        "course_id": cmd.course_id.as_str(),
                        "installment": slice.sequence,
                        "installments": cmd.installments,
                    }))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 4. Persist atomically
        self.ledger.insert_all(&payments).await?;

        tracing::info!(
            user_id = %cmd.user_id,
            course_id = %cmd.course_id,
            installments = cmd.installments,
            total = total.minor_units(),
            "Installment plan created"
        );

        Ok(CreateInstallmentPlanResult { payments })
    }
}
