//! Side effects applied when a payment becomes PAID.
//!
//! Each payment type maps to one [`SettlementEffect`] strategy. Strategies
//! are idempotent, so a dispatch that failed half-way can be re-run against
//! the already-PAID payment.

mod application_fee;
mod installment;
mod tuition;

pub use application_fee::ApplicationFeeEffect;
pub use installment::InstallmentEffect;
pub use tuition::TuitionEffect;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{Payment, PaymentReference, PaymentType};
use crate::ports::{ApplicationStore, EnrollmentStore, PaymentLedger};

/// What a strategy did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    /// Enrollment exists for the payer; `created` is false if it already did.
    Enrolled {
        enrollment_id: String,
        created: bool,
    },

    ApplicationMarkedPaid,

    /// No application matched. Settlement still stands.
    ApplicationMissing,

    /// Installment group not yet fully paid; nothing to do.
    InstallmentsOutstanding { paid: u32, total: u32 },
}

impl EffectOutcome {
    pub fn enrollment_id(&self) -> Option<&str> {
        match self {
            EffectOutcome::Enrolled { enrollment_id, .. } => Some(enrollment_id),
            _ => None,
        }
    }
}

/// Errors from applying a side effect. Never rolls back a PAID payment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No side effect registered for {0}")]
    NoStrategy(PaymentType),

    #[error("Payment {0} has no course")]
    MissingCourse(PaymentReference),

    #[error("Downstream write failed: {0}")]
    Downstream(String),
}

impl From<DomainError> for DispatchError {
    fn from(err: DomainError) -> Self {
        DispatchError::Downstream(err.to_string())
    }
}

/// Idempotent consequence of a payment settling.
#[async_trait]
pub trait SettlementEffect: Send + Sync {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome, DispatchError>;
}

/// Outcome of the dispatch step as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    /// This call applied the side effects.
    Applied(EffectOutcome),

    /// Side effects failed; the payment stays PAID and awaits reconciliation.
    Failed(String),

    /// This call did not settle the payment, so it dispatched nothing.
    NotRun,
}

/// Strategy table keyed by payment type.
#[derive(Default, Clone)]
pub struct SideEffectDispatcher {
    effects: HashMap<PaymentType, Arc<dyn SettlementEffect>>,
}

impl SideEffectDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the strategy for a payment type.
    pub fn register(mut self, payment_type: PaymentType, effect: Arc<dyn SettlementEffect>) -> Self {
        self.effects.insert(payment_type, effect);
        self
    }

    /// The production table: fee, tuition and installment strategies.
    pub fn standard(
        ledger: Arc<dyn PaymentLedger>,
        enrollments: Arc<dyn EnrollmentStore>,
        applications: Arc<dyn ApplicationStore>,
    ) -> Self {
        let tuition = Arc::new(TuitionEffect::new(enrollments));
        Self::new()
            .register(
                PaymentType::ApplicationFee,
                Arc::new(ApplicationFeeEffect::new(applications)),
            )
            .register(PaymentType::Tuition, tuition.clone())
            .register(
                PaymentType::Installment,
                Arc::new(InstallmentEffect::new(ledger, tuition)),
            )
    }

    pub async fn dispatch(&self, payment: &Payment) -> Result<EffectOutcome, DispatchError> {
        let effect = self
            .effects
            .get(&payment.payment_type)
            .ok_or(DispatchError::NoStrategy(payment.payment_type))?;
        effect.apply(payment).await
    }

    /// Dispatch and, on success, record `dispatched_at` on the ledger.
    ///
    /// Failures are logged and reported, never propagated.
    pub async fn dispatch_and_record(
        &self,
        ledger: &dyn PaymentLedger,
        payment: &Payment,
    ) -> DispatchStatus {
        match self.dispatch(payment).await {
            Ok(outcome) => {
                if let EffectOutcome::ApplicationMissing = outcome {
                    tracing::warn!(
                        reference = %payment.reference,
                        user_id = %payment.user_id,
                        "Application fee settled but no matching application"
                    );
                }
                match ledger
                    .mark_dispatched(&payment.id, Timestamp::now(), outcome.enrollment_id())
                    .await
                {
                    Ok(_) => tracing::info!(
                        reference = %payment.reference,
                        payment_type = %payment.payment_type,
                        outcome = ?outcome,
                        "Settlement side effects applied"
                    ),
                    // dispatched_at stays NULL; reconcile re-runs the effects.
                    Err(e) => tracing::error!(
                        reference = %payment.reference,
                        outcome = ?outcome,
                        error = %e,
                        "Side effects applied but dispatch not recorded"
                    ),
                }
                DispatchStatus::Applied(outcome)
            }
            Err(e) => {
                tracing::error!(
                    reference = %payment.reference,
                    payment_type = %payment.payment_type,
                    error = %e,
                    "Side effect dispatch failed; payment left for reconciliation"
                );
                DispatchStatus::Failed(e.to_string())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::paid;
    use super::*;
    use crate::adapters::memory::{
        InMemoryApplicationStore, InMemoryEnrollmentStore, InMemoryPaymentLedger,
    };

    fn dispatcher() -> (
        SideEffectDispatcher,
        Arc<InMemoryPaymentLedger>,
        Arc<InMemoryEnrollmentStore>,
    ) {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let enrollments = Arc::new(InMemoryEnrollmentStore::new());
        let applications = Arc::new(InMemoryApplicationStore::new());
        let dispatcher =
            SideEffectDispatcher::standard(ledger.clone(), enrollments.clone(), applications);
        (dispatcher, ledger, enrollments)
    }

    #[tokio::test]
    async fn unregistered_type_is_an_error() {
        let payment = paid("KM_1", PaymentType::Tuition, Some("c1"));
        let err = SideEffectDispatcher::new().dispatch(&payment).await.unwrap_err();
        assert_eq!(err, DispatchError::NoStrategy(PaymentType::Tuition));
    }

    #[tokio::test]
    async fn dispatch_and_record_stamps_ledger() {
        let (dispatcher, ledger, enrollments) = dispatcher();
        let payment = paid("KM_1", PaymentType::Tuition, Some("c1"));
        ledger.insert(&payment).await.unwrap();

        let status = dispatcher.dispatch_and_record(ledger.as_ref(), &payment).await;

        assert!(matches!(status, DispatchStatus::Applied(EffectOutcome::Enrolled { created: true, .. })));
        let stored = ledger.find_by_id(&payment.id).await.unwrap().unwrap();
        assert!(stored.dispatched_at.is_some());
        assert!(stored.enrollment_id.is_some());
        assert_eq!(enrollments.created_count(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_payment_undispatched() {
        let (dispatcher, ledger, enrollments) = dispatcher();
        let payment = paid("KM_1", PaymentType::Tuition, Some("c1"));
        ledger.insert(&payment).await.unwrap();
        enrollments.set_failure(Some("connection reset"));

        let status = dispatcher.dispatch_and_record(ledger.as_ref(), &payment).await;

        assert!(matches!(status, DispatchStatus::Failed(_)));
        let stored = ledger.find_by_id(&payment.id).await.unwrap().unwrap();
        assert!(stored.awaiting_dispatch());
    }

    #[tokio::test]
    async fn unrecorded_dispatch_still_reports_applied_effects() {
        let (dispatcher, ledger, enrollments) = dispatcher();
        // Never inserted, so recording the dispatch fails
        let payment = paid("KM_1", PaymentType::Tuition, Some("c1"));

        let status = dispatcher.dispatch_and_record(ledger.as_ref(), &payment).await;

        assert!(matches!(status, DispatchStatus::Applied(_)));
        assert_eq!(enrollments.created_count(), 1);
        assert!(ledger.is_empty());
    }
}
