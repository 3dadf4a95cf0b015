//! Installment groups and plan scheduling.
//!
//! An installment group is every INSTALLMENT payment sharing a user and
//! course, minus FAILED slices that already have a replacement. A FAILED
//! slice nobody has re-charged still counts as outstanding. The group is
//! derived from the ledger on demand, never stored.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Amount, Timestamp, ValidationError};

use super::{Payment, PaymentStatus};

pub const MIN_INSTALLMENTS: u32 = 2;
pub const MAX_INSTALLMENTS: u32 = 12;

/// Paid vs. total slices of an installment group at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentProgress {
    pub paid: u32,
    pub total: u32,
}

impl InstallmentProgress {
    pub fn new(paid: u32, total: u32) -> Self {
        Self { paid, total }
    }

    /// An empty group is never fully paid.
    pub fn is_fully_paid(&self) -> bool {
        self.total > 0 && self.paid == self.total
    }

    pub fn outstanding(&self) -> u32 {
        self.total.saturating_sub(self.paid)
    }
}

/// Progress of one group, given every INSTALLMENT payment in it.
pub fn group_progress(slices: &[Payment]) -> InstallmentProgress {
    let replaced = |slice: &Payment| {
        slices
            .iter()
            .any(|other| other.replaces_payment_id == Some(slice.id))
    };

    slices
        .iter()
        .filter(|slice| !(slice.status == PaymentStatus::Failed && replaced(slice)))
        .fold(InstallmentProgress::new(0, 0), |acc, slice| {
            InstallmentProgress::new(
                acc.paid + u32::from(slice.status == PaymentStatus::Paid),
                acc.total + 1,
            )
        })
}

/// One slice of a plan before it is written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentSlice {
    pub sequence: u32,
    pub amount: Amount,
    pub due_date: Timestamp,
}

/// Splits `total` into `count` slices due every `interval_days`.
///
/// The last slice absorbs any remainder so the slices always sum to `total`.
pub fn schedule_installments(
    total: Amount,
    count: u32,
    first_due_date: Timestamp,
    interval_days: u32,
) -> Result<Vec<InstallmentSlice>, ValidationError> {
    if !(MIN_INSTALLMENTS..=MAX_INSTALLMENTS).contains(&count) {
        return Err(ValidationError::out_of_range(
            "installments",
            MIN_INSTALLMENTS as i64,
            MAX_INSTALLMENTS as i64,
            count as i64,
        ));
    }
    if interval_days == 0 {
        return Err(ValidationError::out_of_range("interval_days", 1, 365, 0));
    }

    let amounts = total.split(count)?;
    Ok(amounts
        .into_iter()
        .enumerate()
        .map(|(i, amount)| InstallmentSlice {
            sequence: i as u32 + 1,
            amount,
            due_date: first_due_date.add_days(i as i64 * interval_days as i64),
        })
        .collect())
}
