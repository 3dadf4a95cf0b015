//! Refund repository port.
//!
//! Enforces the "one open refund per payment" rule atomically at insert
//! time and applies refund status changes with compare-and-swap.

use crate::domain::foundation::{DomainError, PaymentId, RefundId};
use crate::domain::refund::{Refund, RefundTransition};
use async_trait::async_trait;

use super::TransitionOutcome;

/// Result of inserting a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertRefundResult {
    Inserted,

    /// Another non-terminal refund already exists for the payment.
    OpenRefundExists(RefundId),
}

/// Repository port for Refund records.
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Insert a refund unless the payment already has an open one.
    ///
    /// The check and insert must be a single atomic step.
    async fn insert_if_no_open(&self, refund: &Refund) -> Result<InsertRefundResult, DomainError>;

    async fn find_by_id(&self, id: &RefundId) -> Result<Option<Refund>, DomainError>;

    /// Lookup used by refund webhooks.
    async fn find_by_provider_reference(
        &self,
        provider_refund_reference: &str,
    ) -> Result<Option<Refund>, DomainError>;

    async fn find_open_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Refund>, DomainError>;

    /// Apply a status transition iff the stored status equals `transition.from`.
    ///
    /// # Errors
    ///
    /// - `RefundNotFound` if no refund has this id
    async fn apply_transition(
        &self,
        id: &RefundId,
        transition: &RefundTransition,
    ) -> Result<TransitionOutcome<Refund>, DomainError>;

    /// Non-terminal refunds, oldest first.
    async fn list_open(&self) -> Result<Vec<Refund>, DomainError>;

    /// Every refund for a payment, newest first.
    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError>;
}
