//! Payment domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Payment aggregate and CAS transitions
//! - `status` - PaymentStatus state machine
//! - `payment_type` - What a payment settles (fee, tuition, installment)
//! - `reference` - Idempotency reference shared with the gateway
//! - `installment` - Installment group progress and plan scheduling
//! - `errors` - SettlementError taxonomy

mod aggregate;
mod errors;
mod installment;
mod payment_type;
mod reference;
mod status;

pub use aggregate::{Payment, PaymentTransition};
pub use errors::SettlementError;
pub use installment::{
    group_progress, schedule_installments, InstallmentProgress, InstallmentSlice, MAX_INSTALLMENTS,
    MIN_INSTALLMENTS,
};
pub use payment_type::PaymentType;
pub use reference::PaymentReference;
pub use status::PaymentStatus;
