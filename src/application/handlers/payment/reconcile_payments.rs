//! Reconciliation - re-verifies stale PENDING payments and re-runs missed dispatches.

use std::sync::Arc;

use serde::Serialize;

use crate::application::effects::{DispatchStatus, SideEffectDispatcher};
use crate::domain::foundation::Timestamp;
use crate::domain::payment::{PaymentReference, PaymentStatus, SettlementError};
use crate::ports::PaymentLedger;

use super::{VerifyAndSettleCommand, VerifyAndSettleHandler};

#[derive(Debug, Clone)]
pub struct ReconcilePaymentsCommand {
    /// Only PENDING payments at least this old are re-verified.
    pub pending_older_than_secs: i64,
    pub limit: u32,
}

impl Default for ReconcilePaymentsCommand {
    fn default() -> Self {
        Self {
            pending_older_than_secs: 15 * 60,
            limit: 100,
        }
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub verified: usize,
    pub settled: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub redispatched: usize,
    pub dispatch_failures: usize,

    /// `(reference, message)` for payments that could not be processed.
    pub errors: Vec<(String, String)>,
}

pub struct ReconcilePaymentsHandler {
    ledger: Arc<dyn PaymentLedger>,
    verifier: Arc<VerifyAndSettleHandler>,
    dispatcher: SideEffectDispatcher,
}

impl ReconcilePaymentsHandler {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        verifier: Arc<VerifyAndSettleHandler>,
        dispatcher: SideEffectDispatcher,
    ) -> Self {
        Self {
            ledger,
            verifier,
            dispatcher,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcilePaymentsCommand,
    ) -> Result<ReconcileReport, SettlementError> {
        let mut report = ReconcileReport::default();

        // 1. Stale PENDING payments go back through verification
        let cutoff = Timestamp::now().minus_secs(cmd.pending_older_than_secs);
        let stale = self.ledger.list_pending_older_than(cutoff, cmd.limit).await?;
        for payment in stale {
            report.verified += 1;
            let reference = payment.reference.to_string();
            match self
                .verifier
                .handle(VerifyAndSettleCommand {
                    reference: reference.clone(),
                })
                .await
            {
                Ok(result) => match result.payment_status {
                    PaymentStatus::Paid => {
                        report.settled += 1;
                        if let DispatchStatus::Failed(_) = result.dispatch {
                            report.dispatch_failures += 1;
                        }
                    }
                    PaymentStatus::Failed => report.failed += 1,
                    _ => report.still_pending += 1,
                },
                Err(e) => report.errors.push((reference, e.to_string())),
            }
        }

        // 2. PAID payments whose side effects never landed
        let undispatched = self.ledger.list_undispatched_paid(cmd.limit).await?;
        for payment in undispatched {
            match self
                .dispatcher
                .dispatch_and_record(self.ledger.as_ref(), &payment)
                .await
            {
                DispatchStatus::Applied(_) => report.redispatched += 1,
                DispatchStatus::Failed(message) => {
                    report.dispatch_failures += 1;
                    report.errors.push((payment.reference.to_string(), message));
                }
                DispatchStatus::NotRun => {}
            }
        }

        tracing::info!(
            verified = report.verified,
            settled = report.settled,
            failed = report.failed,
            redispatched = report.redispatched,
            errors = report.errors.len(),
            "Reconciliation pass finished"
        );

        Ok(report)
    }
}

#[derive(Debug, Clone)]
pub struct RetryDispatchCommand {
    pub reference: String,
}

/// Re-runs side effects for one PAID payment.
///
/// Strategies are idempotent, so this is safe even if an earlier dispatch
/// succeeded.
pub struct RetryDispatchHandler {
    ledger: Arc<dyn PaymentLedger>,
    dispatcher: SideEffectDispatcher,
}

impl RetryDispatchHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>, dispatcher: SideEffectDispatcher) -> Self {
        Self { ledger, dispatcher }
    }

    pub async fn handle(&self, cmd: RetryDispatchCommand) -> Result<DispatchStatus, SettlementError> {
        let reference = PaymentReference::new(cmd.reference.as_str())
            .map_err(|_| SettlementError::PaymentNotFound(cmd.reference.clone()))?;
        let payment = self
            .ledger
            .find_by_reference(&reference)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(cmd.reference.clone()))?;

        if !payment.is_paid() {
            return Err(SettlementError::invalid_state(
                payment.status.as_str(),
                "retry dispatch",
            ));
        }

        match self
            .dispatcher
            .dispatch_and_record(self.ledger.as_ref(), &payment)
            .await
        {
            DispatchStatus::Failed(message) => Err(SettlementError::DispatchFailure(message)),
            status => Ok(status),
        }
    }
}
