//! HTTP adapters - REST API over the settlement handlers.

pub mod caller;
pub mod settlement;

pub use caller::{AdminUser, AuthenticatedUser};
pub use settlement::{settlement_router, SettlementAppState};
