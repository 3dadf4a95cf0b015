//! HTTP adapter for the settlement endpoints.
//!
//! - `/api/payments`, `/api/installment-plans`, `/api/installments` - payers
//! - `/api/admin/...` - refunds, reconciliation and dispatch retries
//! - `/api/webhooks/paystack` - gateway notifications

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{SettlementApiError, SettlementAppState};
pub use routes::settlement_router;
