//! Refund status state machine.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    /// Recorded, provider not yet called.
    Pending,

    /// Provider accepted the refund and is processing it.
    Processing,

    /// Needs a human decision (off-gateway payment or unknown provider outcome).
    ManualReview,

    /// Admin approved a manual refund; completes once money is returned.
    Approved,

    Rejected,
    Failed,
    Completed,
}

impl RefundStatus {
    pub const ALL: [RefundStatus; 7] = [
        RefundStatus::Pending,
        RefundStatus::Processing,
        RefundStatus::ManualReview,
        RefundStatus::Approved,
        RefundStatus::Rejected,
        RefundStatus::Failed,
        RefundStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "PENDING",
            RefundStatus::Processing => "PROCESSING",
            RefundStatus::ManualReview => "MANUAL_REVIEW",
            RefundStatus::Approved => "APPROVED",
            RefundStatus::Rejected => "REJECTED",
            RefundStatus::Failed => "FAILED",
            RefundStatus::Completed => "COMPLETED",
        }
    }

    /// Open refunds block a second refund on the same payment.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses from which `complete_refund` may proceed.
    pub fn is_completable(&self) -> bool {
        matches!(self, RefundStatus::Processing | RefundStatus::Approved)
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RefundStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown refund status: {}", s))
    }
}

impl StateMachine for RefundStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use RefundStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Processing)
                | (Pending, ManualReview)
                | (Pending, Failed)
            // From PROCESSING
                | (Processing, Completed)
                | (Processing, Failed)
            // From MANUAL_REVIEW
                | (ManualReview, Approved)
                | (ManualReview, Rejected)
            // From APPROVED
                | (Approved, Completed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use RefundStatus::*;
        match self {
            Pending => vec![Processing, ManualReview, Failed],
            Processing => vec![Completed, Failed],
            ManualReview => vec![Approved, Rejected],
            Approved => vec![Completed],
            Rejected | Failed | Completed => vec![],
        }
    }
}
