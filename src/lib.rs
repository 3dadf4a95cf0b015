//! Tuition Settlement - payment settlement and refund engine for course payments.
//!
//! Charges are confirmed with the payment gateway, settled exactly once
//! through status-guarded ledger writes, and then trigger the side effects
//! of their payment type (application paid, enrollment created). Refunds run
//! through their own lifecycle with manual review for uncertain outcomes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
