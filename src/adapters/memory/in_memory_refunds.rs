//! In-memory refund repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, RefundId};
use crate::domain::refund::{Refund, RefundTransition};
use crate::ports::{InsertRefundResult, RefundRepository, TransitionOutcome};

/// In-memory implementation of the RefundRepository port.
///
/// The open-refund check and the insert happen under one lock, mirroring
/// the partial unique index used by the PostgreSQL adapter.
#[derive(Default)]
pub struct InMemoryRefundRepository {
    refunds: Mutex<HashMap<RefundId, Refund>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RefundId, Refund>>, DomainError> {
        self.refunds
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "Refund store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.refunds.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn insert_if_no_open(&self, refund: &Refund) -> Result<InsertRefundResult, DomainError> {
        let mut stored = self.lock()?;
        if let Some(open) = stored
            .values()
            .find(|r| r.payment_id == refund.payment_id && r.is_open())
        {
            return Ok(InsertRefundResult::OpenRefundExists(open.id));
        }
        stored.insert(refund.id, refund.clone());
        Ok(InsertRefundResult::Inserted)
    }

    async fn find_by_id(&self, id: &RefundId) -> Result<Option<Refund>, DomainError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn find_by_provider_reference(
        &self,
        provider_refund_reference: &str,
    ) -> Result<Option<Refund>, DomainError> {
        Ok(self
            .lock()?
            .values()
            .find(|r| r.provider_refund_reference.as_deref() == Some(provider_refund_reference))
            .cloned())
    }

    async fn find_open_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Refund>, DomainError> {
        Ok(self
            .lock()?
            .values()
            .find(|r| &r.payment_id == payment_id && r.is_open())
            .cloned())
    }

    async fn apply_transition(
        &self,
        id: &RefundId,
        transition: &RefundTransition,
    ) -> Result<TransitionOutcome<Refund>, DomainError> {
        if !transition.is_legal() {
            return Err(DomainError::invalid_transition(
                transition.from.as_str(),
                transition.to.as_str(),
            ));
        }

        let mut stored = self.lock()?;
        let current = stored.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::RefundNotFound, format!("Refund {} not found", id))
        })?;

        if current.status != transition.from {
            return Ok(TransitionOutcome::Stale {
                current: current.clone(),
            });
        }

        *current = transition.apply_to(current);
        Ok(TransitionOutcome::Applied(current.clone()))
    }

    async fn list_open(&self) -> Result<Vec<Refund>, DomainError> {
        let mut open: Vec<Refund> = self
            .lock()?
            .values()
            .filter(|r| r.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(open)
    }

    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError> {
        let mut refunds: Vec<Refund> = self
            .lock()?
            .values()
            .filter(|r| &r.payment_id == payment_id)
            .cloned()
            .collect();
        refunds.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(refunds)
    }
}
