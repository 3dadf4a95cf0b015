//! Payment aggregate and its status transitions.
//!
//! The aggregate is a snapshot of a ledger row. Status never changes on the
//! struct directly: callers describe the change as a [`PaymentTransition`]
//! and hand it to the ledger, which applies it only if the stored status
//! still equals `from`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Amount, CourseId, PaymentId, StateMachine, Timestamp, UserId, ValidationError,
};

use super::{PaymentReference, PaymentStatus, PaymentType};

/// Payment aggregate - one charge attempt against the gateway.
///
/// # Invariants
///
/// - `reference` is unique and never changes
/// - `course_id` is present for TUITION and INSTALLMENT payments
/// - `paid_at` is set iff the payment has been PAID (it survives a refund)
/// - a FAILED installment slice has at most one replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub reference: PaymentReference,
    pub payment_type: PaymentType,
    pub amount: Amount,
    pub currency: String,
    pub status: PaymentStatus,
    pub user_id: UserId,
    pub course_id: Option<CourseId>,
    pub application_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub due_date: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,
    pub provider_transaction_id: Option<String>,

    /// Checkout URL returned by the gateway on initialize.
    pub authorization_url: Option<String>,
    pub access_code: Option<String>,

    pub failure_reason: Option<String>,

    /// Echoed to the gateway on initialize.
    pub metadata: serde_json::Value,

    /// When side effects were applied. `None` on a PAID payment means the
    /// dispatch still has to happen.
    pub dispatched_at: Option<Timestamp>,

    /// The FAILED installment slice this payment re-charges.
    pub replaces_payment_id: Option<PaymentId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Creates a new PENDING payment.
    ///
    /// # Errors
    ///
    /// Returns error if the payment type needs a course and none is given,
    /// or if the currency code is not three letters.
    pub fn pending(
        reference: PaymentReference,
        payment_type: PaymentType,
        amount: Amount,
        currency: impl Into<String>,
        user_id: UserId,
        course_id: Option<CourseId>,
    ) -> Result<Self, ValidationError> {
        if payment_type.requires_course() && course_id.is_none() {
            return Err(ValidationError::empty_field("course_id"));
        }
        let currency = currency.into().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "expected a three-letter ISO 4217 code",
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id: PaymentId::new(),
            reference,
            payment_type,
            amount,
            currency,
            status: PaymentStatus::Pending,
            user_id,
            course_id,
            application_id: None,
            enrollment_id: None,
            due_date: None,
            paid_at: None,
            provider_transaction_id: None,
            authorization_url: None,
            access_code: None,
            failure_reason: None,
            metadata: serde_json::Value::Object(Default::default()),
            dispatched_at: None,
            replaces_payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// A fresh PENDING slice standing in for a FAILED installment.
    ///
    /// # Errors
    ///
    /// Returns error unless `failed` is a FAILED installment.
    pub fn replacing(failed: &Payment, reference: PaymentReference) -> Result<Self, ValidationError> {
        if failed.payment_type != PaymentType::Installment || failed.status != PaymentStatus::Failed {
            return Err(ValidationError::invalid_format(
                "payment_id",
                format!("{} is not a failed installment", failed.reference),
            ));
        }

        let mut metadata = failed.metadata.clone();
        if let serde_json::Value::Object(map) = &mut metadata {
            map.insert(
                "replaces".to_string(),
                serde_json::Value::String(failed.reference.to_string()),
            );
        }

        let mut replacement = Self::pending(
            reference,
            PaymentType::Installment,
            failed.amount,
            failed.currency.as_str(),
            failed.user_id.clone(),
            failed.course_id.clone(),
        )?
        .with_metadata(metadata);
        replacement.due_date = failed.due_date;
        replacement.replaces_payment_id = Some(failed.id);
        Ok(replacement)
    }

    pub fn with_due_date(mut self, due_date: Timestamp) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// PAID but side effects not yet recorded as applied.
    pub fn awaiting_dispatch(&self) -> bool {
        self.is_paid() && self.dispatched_at.is_none()
    }

    /// Whether the gateway checkout has already been created for this payment.
    pub fn has_checkout(&self) -> bool {
        self.authorization_url.is_some()
    }
}

/// A status change to apply with compare-and-swap semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub paid_at: Option<Timestamp>,
    pub provider_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub occurred_at: Timestamp,
}

impl PaymentTransition {
    /// Validates the edge against the payment state machine.
    pub fn new(from: PaymentStatus, to: PaymentStatus) -> Result<Self, ValidationError> {
        from.transition_to(to)?;
        Ok(Self {
            from,
            to,
            paid_at: None,
            provider_transaction_id: None,
            failure_reason: None,
            occurred_at: Timestamp::now(),
        })
    }

    /// PENDING -> PAID with the provider's confirmation details.
    pub fn settle(provider_transaction_id: Option<String>, paid_at: Timestamp) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Paid,
            paid_at: Some(paid_at),
            provider_transaction_id,
            failure_reason: None,
            occurred_at: Timestamp::now(),
        }
    }

    /// PENDING -> FAILED.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Failed,
            paid_at: None,
            provider_transaction_id: None,
            failure_reason: Some(reason.into()),
            occurred_at: Timestamp::now(),
        }
    }

    /// PAID -> REFUNDED.
    pub fn refund() -> Self {
        Self {
            from: PaymentStatus::Paid,
            to: PaymentStatus::Refunded,
            paid_at: None,
            provider_transaction_id: None,
            failure_reason: None,
            occurred_at: Timestamp::now(),
        }
    }

    /// Whether `from -> to` is an edge of the payment state machine.
    ///
    /// Stores refuse transitions for which this is false.
    pub fn is_legal(&self) -> bool {
        self.from.can_transition_to(&self.to)
    }

    /// Returns the payment as it looks after this transition.
    ///
    /// Does not check `from`; the store does that atomically.
    pub fn apply_to(&self, payment: &Payment) -> Payment {
        let mut next = payment.clone();
        next.status = self.to;
        if let Some(paid_at) = self.paid_at {
            next.paid_at = Some(paid_at);
        }
        if let Some(tx) = &self.provider_transaction_id {
            next.provider_transaction_id = Some(tx.clone());
        }
        if let Some(reason) = &self.failure_reason {
            next.failure_reason = Some(reason.clone());
        }
        next.updated_at = self.occurred_at;
        next
    }
}
