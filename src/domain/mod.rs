//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `payment` - Payment lifecycle, installment groups and settlement errors
//! - `refund` - Refund lifecycle

pub mod foundation;
pub mod payment;
pub mod refund;
