//! In-memory payment ledger.
//!
//! Useful for tests and local development. Compare-and-swap is emulated by
//! doing the status check and the write under one `Mutex` acquisition, which
//! gives the same exactly-once guarantee as the guarded SQL update.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::foundation::{
    CourseId, DomainError, ErrorCode, PaymentId, Timestamp, UserId,
};
use crate::domain::payment::{
    group_progress, InstallmentProgress, Payment, PaymentReference, PaymentStatus,
    PaymentTransition, PaymentType,
};
use crate::ports::{PaymentLedger, TransitionOutcome};

/// In-memory implementation of the PaymentLedger port.
///
/// # Example
///
/// ```ignore
/// let ledger = InMemoryPaymentLedger::new();
/// ledger.insert(&payment).await?;
/// let outcome = ledger.apply_transition(&payment.id, &PaymentTransition::fail("abandoned")).await?;
/// ```
#[derive(Default)]
pub struct InMemoryPaymentLedger {
    payments: Mutex<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<PaymentId, Payment>>, DomainError> {
        self.payments
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "Payment ledger lock poisoned"))
    }

    /// Number of stored payments.
    pub fn len(&self) -> usize {
        self.payments.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_newest_first(mut payments: Vec<Payment>) -> Vec<Payment> {
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments
    }

    fn sorted_oldest_first(mut payments: Vec<Payment>, limit: u32) -> Vec<Payment> {
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments.truncate(limit as usize);
        payments
    }
}

fn duplicate_reference(reference: &PaymentReference) -> DomainError {
    DomainError::new(
        ErrorCode::DuplicateReference,
        format!("Payment reference {} already exists", reference),
    )
    .with_detail("reference", reference.as_str())
}

fn in_group(payment: &Payment, user_id: &UserId, course_id: &CourseId) -> bool {
    payment.payment_type == PaymentType::Installment
        && &payment.user_id == user_id
        && payment.course_id.as_ref() == Some(course_id)
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        self.insert_all(std::slice::from_ref(payment)).await
    }

    async fn insert_all(&self, payments: &[Payment]) -> Result<(), DomainError> {
        let mut stored = self.lock()?;
        for (i, payment) in payments.iter().enumerate() {
            let clashes_stored = stored.values().any(|p| p.reference == payment.reference);
            let clashes_batch = payments[..i].iter().any(|p| p.reference == payment.reference);
            if clashes_stored || clashes_batch {
                return Err(duplicate_reference(&payment.reference));
            }
        }
        for payment in payments {
            stored.insert(payment.id, payment.clone());
        }
        Ok(())
    }

    async fn insert_replacement(&self, replacement: &Payment) -> Result<Payment, DomainError> {
        let failed_id = replacement.replaces_payment_id.ok_or_else(|| {
            DomainError::validation("replaces_payment_id", "Replacement must name its slice")
        })?;

        let mut stored = self.lock()?;
        if let Some(existing) = stored
            .values()
            .find(|p| p.replaces_payment_id == Some(failed_id))
        {
            return Ok(existing.clone());
        }
        if stored.values().any(|p| p.reference == replacement.reference) {
            return Err(duplicate_reference(&replacement.reference));
        }
        stored.insert(replacement.id, replacement.clone());
        Ok(replacement.clone())
    }

    async fn find_replacement(
        &self,
        failed_id: &PaymentId,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .lock()?
            .values()
            .find(|p| p.replaces_payment_id.as_ref() == Some(failed_id))
            .cloned())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .lock()?
            .values()
            .find(|p| &p.reference == reference)
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: &PaymentId,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome<Payment>, DomainError> {
        if !transition.is_legal() {
            return Err(DomainError::invalid_transition(
                transition.from.as_str(),
                transition.to.as_str(),
            ));
        }

        let mut stored = self.lock()?;
        let current = stored.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment {} not found", id))
        })?;

        if current.status != transition.from {
            return Ok(TransitionOutcome::Stale {
                current: current.clone(),
            });
        }

        *current = transition.apply_to(current);
        Ok(TransitionOutcome::Applied(current.clone()))
    }

    async fn record_checkout(
        &self,
        id: &PaymentId,
        authorization_url: &str,
        access_code: &str,
    ) -> Result<(), DomainError> {
        let mut stored = self.lock()?;
        let payment = stored.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment {} not found", id))
        })?;
        payment.authorization_url = Some(authorization_url.to_string());
        payment.access_code = Some(access_code.to_string());
        payment.updated_at = Timestamp::now();
        Ok(())
    }

    async fn mark_dispatched(
        &self,
        id: &PaymentId,
        at: Timestamp,
        enrollment_id: Option<&str>,
    ) -> Result<bool, DomainError> {
        let mut stored = self.lock()?;
        let payment = stored.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment {} not found", id))
        })?;
        if payment.dispatched_at.is_some() {
            return Ok(false);
        }
        payment.dispatched_at = Some(at);
        if let Some(enrollment_id) = enrollment_id {
            payment.enrollment_id = Some(enrollment_id.to_string());
        }
        payment.updated_at = at;
        Ok(true)
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError> {
        let payments = self
            .lock()?
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(payments))
    }

    async fn list_by_user_with_status(
        &self,
        user_id: &UserId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, DomainError> {
        let payments = self
            .lock()?
            .values()
            .filter(|p| &p.user_id == user_id && p.status == status)
            .cloned()
            .collect();
        Ok(Self::sorted_newest_first(payments))
    }

    async fn installment_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<InstallmentProgress, DomainError> {
        let group: Vec<Payment> = self
            .lock()?
            .values()
            .filter(|p| in_group(p, user_id, course_id))
            .cloned()
            .collect();
        Ok(group_progress(&group))
    }

    async fn list_pending_older_than(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let payments = self
            .lock()?
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at.is_before(&cutoff))
            .cloned()
            .collect();
        Ok(Self::sorted_oldest_first(payments, limit))
    }

    async fn list_undispatched_paid(&self, limit: u32) -> Result<Vec<Payment>, DomainError> {
        let payments = self
            .lock()?
            .values()
            .filter(|p| p.awaiting_dispatch())
            .cloned()
            .collect();
        Ok(Self::sorted_oldest_first(payments, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Amount;
    use std::sync::Arc;

    fn installment(reference: &str, user: &str, course: &str) -> Payment {
        Payment::pending(
            PaymentReference::new(reference).unwrap(),
            PaymentType::Installment,
            Amount::new(10_000).unwrap(),
            "NGN",
            UserId::new(user).unwrap(),
            Some(CourseId::new(course).unwrap()),
        )
        .unwrap()
    }

    fn settle() -> PaymentTransition {
        PaymentTransition::settle(Some("tx".into()), Timestamp::now())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_reference() {
        let ledger = InMemoryPaymentLedger::new();
        ledger.insert(&installment("KM_1", "u1", "c1")).await.unwrap();

        let err = ledger.insert(&installment("KM_1", "u1", "c1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateReference);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn insert_all_is_all_or_nothing() {
        let ledger = InMemoryPaymentLedger::new();
        let batch = vec![installment("KM_1", "u1", "c1"), installment("KM_1", "u1", "c1")];

        assert!(ledger.insert_all(&batch).await.is_err());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn transition_applies_once_then_goes_stale() {
        let ledger = InMemoryPaymentLedger::new();
        let payment = installment("KM_1", "u1", "c1");
        ledger.insert(&payment).await.unwrap();

        let first = ledger.apply_transition(&payment.id, &settle()).await.unwrap();
        let second = ledger.apply_transition(&payment.id, &settle()).await.unwrap();

        assert!(first.was_applied());
        match second {
            TransitionOutcome::Stale { current } => assert_eq!(current.status, PaymentStatus::Paid),
            other => panic!("expected stale, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn transition_on_missing_payment_is_not_found() {
        let ledger = InMemoryPaymentLedger::new();
        let err = ledger
            .apply_transition(&PaymentId::new(), &settle())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentNotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_have_single_winner() {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let payment = installment("KM_1", "u1", "c1");
        ledger.insert(&payment).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let id = payment.id;
                tokio::spawn(async move { ledger.apply_transition(&id, &settle()).await })
            })
            .collect();

        let mut applied = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().was_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn illegal_edge_is_refused_before_the_status_check() {
        let ledger = InMemoryPaymentLedger::new();
        let payment = installment("KM_1", "u1", "c1");
        ledger.insert(&payment).await.unwrap();
        ledger
            .apply_transition(&payment.id, &PaymentTransition::fail("declined"))
            .await
            .unwrap();

        let mut revive = settle();
        revive.from = PaymentStatus::Failed;
        let err = ledger.apply_transition(&payment.id, &revive).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        let stored = ledger.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert!(stored.paid_at.is_none());
    }

    #[tokio::test]
    async fn installment_progress_counts_unreplaced_failures_and_skips_other_groups() {
        let ledger = InMemoryPaymentLedger::new();
        let a = installment("KM_a", "u1", "c1");
        let b = installment("KM_b", "u1", "c1");
        let failed = installment("KM_f", "u1", "c1");
        let other_course = installment("KM_o", "u1", "c2");
        ledger
            .insert_all(&[a.clone(), b.clone(), failed.clone(), other_course])
            .await
            .unwrap();

        ledger.apply_transition(&a.id, &settle()).await.unwrap();
        ledger.apply_transition(&b.id, &settle()).await.unwrap();
        let failed = ledger
            .apply_transition(&failed.id, &PaymentTransition::fail("declined"))
            .await
            .unwrap()
            .into_inner();

        let user = UserId::new("u1").unwrap();
        let course = CourseId::new("c1").unwrap();
        let progress = ledger.installment_progress(&user, &course).await.unwrap();
        assert_eq!(progress, InstallmentProgress::new(2, 3));

        let replacement = Payment::replacing(&failed, PaymentReference::new("KM_f2").unwrap())
            .unwrap();
        ledger.insert_replacement(&replacement).await.unwrap();
        let progress = ledger.installment_progress(&user, &course).await.unwrap();
        assert_eq!(progress, InstallmentProgress::new(2, 3));

        ledger.apply_transition(&replacement.id, &settle()).await.unwrap();
        let progress = ledger.installment_progress(&user, &course).await.unwrap();
        assert!(progress.is_fully_paid());
    }

    #[tokio::test]
    async fn second_replacement_returns_the_first() {
        let ledger = InMemoryPaymentLedger::new();
        let slice = installment("KM_f", "u1", "c1");
        ledger.insert(&slice).await.unwrap();
        let failed = ledger
            .apply_transition(&slice.id, &PaymentTransition::fail("declined"))
            .await
            .unwrap()
            .into_inner();

        let first = Payment::replacing(&failed, PaymentReference::new("KM_r1").unwrap()).unwrap();
        let second = Payment::replacing(&failed, PaymentReference::new("KM_r2").unwrap()).unwrap();

        let stored_first = ledger.insert_replacement(&first).await.unwrap();
        let stored_second = ledger.insert_replacement(&second).await.unwrap();

        assert_eq!(stored_first.id, first.id);
        assert_eq!(stored_second.id, first.id);
        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.find_replacement(&failed.id).await.unwrap().map(|p| p.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn replacement_without_a_target_is_rejected() {
        let ledger = InMemoryPaymentLedger::new();
        let err = ledger
            .insert_replacement(&installment("KM_1", "u1", "c1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn mark_dispatched_only_once() {
        let ledger = InMemoryPaymentLedger::new();
        let payment = installment("KM_1", "u1", "c1");
        ledger.insert(&payment).await.unwrap();
        ledger.apply_transition(&payment.id, &settle()).await.unwrap();

        assert_eq!(ledger.list_undispatched_paid(10).await.unwrap().len(), 1);
        assert!(ledger
            .mark_dispatched(&payment.id, Timestamp::now(), Some("enr-1"))
            .await
            .unwrap());
        assert!(!ledger
            .mark_dispatched(&payment.id, Timestamp::now(), None)
            .await
            .unwrap());

        let stored = ledger.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.enrollment_id.as_deref(), Some("enr-1"));
        assert!(ledger.list_undispatched_paid(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_older_than_respects_cutoff_and_limit() {
        let ledger = InMemoryPaymentLedger::new();
        ledger
            .insert_all(&[
                installment("KM_1", "u1", "c1"),
                installment("KM_2", "u1", "c1"),
                installment("KM_3", "u1", "c1"),
            ])
            .await
            .unwrap();

        let future = Timestamp::now().add_days(1);
        assert_eq!(ledger.list_pending_older_than(future, 2).await.unwrap().len(), 2);

        let past = Timestamp::now().add_days(-1);
        assert!(ledger.list_pending_older_than(past, 10).await.unwrap().is_empty());
    }
}
