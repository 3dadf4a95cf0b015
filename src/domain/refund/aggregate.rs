//! Refund aggregate.
//!
//! Like payments, refunds change status only through a [`RefundTransition`]
//! applied by the store with compare-and-swap on the current status.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Amount, PaymentId, RefundId, StateMachine, Timestamp, ValidationError,
};
use crate::domain::payment::{Payment, PaymentStatus, SettlementError};

use super::RefundStatus;

/// Refund aggregate - returns all or part of one payment.
///
/// # Invariants
///
/// - `amount` never exceeds the originating payment's amount
/// - at most one open refund exists per payment (enforced by the store)
/// - `completed_at` is set iff status is COMPLETED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub payment_id: PaymentId,
    pub amount: Amount,
    pub currency: String,
    pub reason: String,
    pub status: RefundStatus,
    pub provider_refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub requested_by: Option<String>,
    pub requested_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Refund {
    /// Opens a PENDING refund against a PAID payment.
    ///
    /// # Errors
    ///
    /// - `NotRefundable` unless the payment is PAID
    /// - `InvalidRefundAmount` if the amount is outside `1..=payment.amount`
    /// - `ValidationFailed` if the reason is blank
    pub fn request(
        payment: &Payment,
        reason: impl Into<String>,
        amount: Option<i64>,
        admin_notes: Option<String>,
        requested_by: Option<String>,
    ) -> Result<Self, SettlementError> {
        if payment.status != PaymentStatus::Paid {
            return Err(SettlementError::NotRefundable {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ValidationError::empty_field("reason").into());
        }

        let amount = resolve_refund_amount(amount, payment.amount)?;
        let now = Timestamp::now();
        Ok(Self {
            id: RefundId::new(),
            payment_id: payment.id,
            amount,
            currency: payment.currency.clone(),
            reason,
            status: RefundStatus::Pending,
            provider_refund_reference: None,
            failure_reason: None,
            admin_notes,
            rejection_reason: None,
            requested_by,
            requested_at: now,
            processed_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// True when the full payment amount is being returned.
    pub fn is_full(&self, payment: &Payment) -> bool {
        self.amount == payment.amount
    }
}

/// Requested amount, or the full payment amount when omitted.
pub fn resolve_refund_amount(
    requested: Option<i64>,
    payment_amount: Amount,
) -> Result<Amount, SettlementError> {
    match requested {
        None => Ok(payment_amount),
        Some(value) if value > 0 && value <= payment_amount.minor_units() => {
            Amount::new(value).map_err(SettlementError::from)
        }
        Some(value) => Err(SettlementError::InvalidRefundAmount {
            requested: value,
            max: payment_amount.minor_units(),
        }),
    }
}

/// A refund status change to apply with compare-and-swap semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundTransition {
    pub from: RefundStatus,
    pub to: RefundStatus,
    pub provider_refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub occurred_at: Timestamp,
}

impl RefundTransition {
    /// Validates the edge against the refund state machine.
    pub fn new(from: RefundStatus, to: RefundStatus) -> Result<Self, ValidationError> {
        from.transition_to(to)?;
        Ok(Self {
            from,
            to,
            provider_refund_reference: None,
            failure_reason: None,
            admin_notes: None,
            rejection_reason: None,
            occurred_at: Timestamp::now(),
        })
    }

    fn edge(from: RefundStatus, to: RefundStatus) -> Self {
        Self {
            from,
            to,
            provider_refund_reference: None,
            failure_reason: None,
            admin_notes: None,
            rejection_reason: None,
            occurred_at: Timestamp::now(),
        }
    }

    /// PENDING -> PROCESSING after the provider accepted.
    pub fn processing(provider_refund_reference: Option<String>) -> Self {
        Self {
            provider_refund_reference,
            ..Self::edge(RefundStatus::Pending, RefundStatus::Processing)
        }
    }

    /// PENDING -> MANUAL_REVIEW with a note explaining why.
    pub fn manual_review(note: impl Into<String>) -> Self {
        Self {
            admin_notes: Some(note.into()),
            ..Self::edge(RefundStatus::Pending, RefundStatus::ManualReview)
        }
    }

    /// MANUAL_REVIEW -> APPROVED.
    pub fn approve(admin_notes: Option<String>) -> Self {
        Self {
            admin_notes,
            ..Self::edge(RefundStatus::ManualReview, RefundStatus::Approved)
        }
    }

    /// MANUAL_REVIEW -> REJECTED.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            ..Self::edge(RefundStatus::ManualReview, RefundStatus::Rejected)
        }
    }

    /// PENDING or PROCESSING -> FAILED.
    pub fn fail(from: RefundStatus, reason: impl Into<String>) -> Result<Self, ValidationError> {
        let mut transition = Self::new(from, RefundStatus::Failed)?;
        transition.failure_reason = Some(reason.into());
        Ok(transition)
    }

    /// PROCESSING or APPROVED -> COMPLETED.
    pub fn complete(from: RefundStatus) -> Result<Self, ValidationError> {
        Self::new(from, RefundStatus::Completed)
    }

    /// Whether `from -> to` is an edge of the refund state machine.
    pub fn is_legal(&self) -> bool {
        self.from.can_transition_to(&self.to)
    }

    /// Returns the refund as it looks after this transition.
    pub fn apply_to(&self, refund: &Refund) -> Refund {
        let mut next = refund.clone();
        next.status = self.to;
        if let Some(reference) = &self.provider_refund_reference {
            next.provider_refund_reference = Some(reference.clone());
        }
        if let Some(reason) = &self.failure_reason {
            next.failure_reason = Some(reason.clone());
        }
        if let Some(notes) = &self.admin_notes {
            next.admin_notes = Some(notes.clone());
        }
        if let Some(reason) = &self.rejection_reason {
            next.rejection_reason = Some(reason.clone());
        }
        if matches!(
            self.to,
            RefundStatus::Processing | RefundStatus::Approved | RefundStatus::Rejected
        ) {
            next.processed_at = Some(self.occurred_at);
        }
        if self.to == RefundStatus::Completed {
            next.completed_at = Some(self.occurred_at);
        }
        next.updated_at = self.occurred_at;
        next
    }
}
