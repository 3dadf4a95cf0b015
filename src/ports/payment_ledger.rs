//! Payment ledger port.
//!
//! The ledger is the single source of truth for whether a charge has been
//! applied. Every status write is a status-guarded compare-and-swap: the
//! implementation must perform the check and the write atomically
//! (`UPDATE ... WHERE id = $1 AND status = $2`), never read-then-write.
//!
//! # Example
//!
//! ```ignore
//! match ledger.apply_transition(&payment.id, &PaymentTransition::refund()).await? {
//!     TransitionOutcome::Applied(p) => { /* this call moved PAID -> REFUNDED */ }
//!     TransitionOutcome::Stale { current } => { /* someone else got there first */ }
//! }
//! ```

use crate::domain::foundation::{CourseId, DomainError, PaymentId, Timestamp, UserId};
use crate::domain::payment::{
    InstallmentProgress, Payment, PaymentReference, PaymentStatus, PaymentTransition,
};
use async_trait::async_trait;

/// Result of a compare-and-swap status write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome<T> {
    /// This call performed the transition; carries the updated record.
    Applied(T),

    /// The stored status no longer matched `from`; carries the record as it is now.
    Stale { current: T },
}

impl<T> TransitionOutcome<T> {
    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            TransitionOutcome::Applied(value) => value,
            TransitionOutcome::Stale { current } => current,
        }
    }
}

/// Repository port for Payment records.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert a new payment.
    ///
    /// # Errors
    ///
    /// - `DuplicateReference` if the reference already exists
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError>;

    /// Insert several payments atomically (installment plans).
    async fn insert_all(&self, payments: &[Payment]) -> Result<(), DomainError>;

    /// Insert a replacement slice unless its FAILED slice already has one.
    ///
    /// Returns whichever replacement is stored afterwards, so concurrent
    /// callers all get the same payment back.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if `replacement.replaces_payment_id` is unset
    async fn insert_replacement(&self, replacement: &Payment) -> Result<Payment, DomainError>;

    /// The payment re-charging `failed_id`, if one was created.
    async fn find_replacement(
        &self,
        failed_id: &PaymentId,
    ) -> Result<Option<Payment>, DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Payment>, DomainError>;

    /// Apply a status transition iff the stored status equals `transition.from`.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if `from -> to` is not a legal edge
    /// - `PaymentNotFound` if no payment has this id
    async fn apply_transition(
        &self,
        id: &PaymentId,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome<Payment>, DomainError>;

    /// Store the checkout details returned by the gateway.
    async fn record_checkout(
        &self,
        id: &PaymentId,
        authorization_url: &str,
        access_code: &str,
    ) -> Result<(), DomainError>;

    /// Record that side effects were applied.
    ///
    /// Only sets `dispatched_at` if it is still NULL; returns whether it did.
    async fn mark_dispatched(
        &self,
        id: &PaymentId,
        at: Timestamp,
        enrollment_id: Option<&str>,
    ) -> Result<bool, DomainError>;

    /// All payments for a user, newest first.
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError>;

    /// Payments for a user in one status, newest first.
    async fn list_by_user_with_status(
        &self,
        user_id: &UserId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Paid vs. total of the installment group. FAILED slices count as
    /// outstanding until a replacement exists.
    ///
    /// Computed from storage on every call.
    async fn installment_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<InstallmentProgress, DomainError>;

    /// PENDING payments created before `cutoff`, oldest first.
    async fn list_pending_older_than(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError>;

    /// PAID payments whose side effects were never recorded, oldest first.
    async fn list_undispatched_paid(&self, limit: u32) -> Result<Vec<Payment>, DomainError>;
}
