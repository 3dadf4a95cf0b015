//! Refund handlers.
//!
//! ## Commands
//! - Requesting refunds
//! - Completing, failing and reviewing refunds
//!
//! ## Queries
//! - Open refunds awaiting action (admin)

mod complete_refund;
mod fail_refund;
mod get_pending_refunds;
mod request_refund;
mod review_refund;

// Commands
pub use complete_refund::{CompleteRefundCommand, CompleteRefundHandler, CompleteRefundResult};
pub use fail_refund::{FailRefundCommand, FailRefundHandler};
pub use request_refund::{RequestRefundCommand, RequestRefundHandler, RequestRefundResult};
pub use review_refund::{
    ApproveRefundCommand, ApproveRefundHandler, RejectRefundCommand, RejectRefundHandler,
};

// Queries
pub use get_pending_refunds::GetPendingRefundsHandler;
