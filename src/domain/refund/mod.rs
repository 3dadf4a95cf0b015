//! Refund domain module.
//!
//! - `aggregate` - Refund aggregate, amount resolution and CAS transitions
//! - `status` - RefundStatus state machine

mod aggregate;
mod status;

pub use aggregate::{resolve_refund_amount, Refund, RefundTransition};
pub use status::RefundStatus;
