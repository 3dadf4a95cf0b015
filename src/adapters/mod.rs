//! Adapters - Implementations of port interfaces.
//!
//! - `paystack` - Payment gateway (live and mock)
//! - `postgres` - Ledger, refunds and collaborator tables
//! - `memory` - In-memory ports for tests and local runs
//! - `http` - Axum REST surface

pub mod http;
pub mod memory;
pub mod paystack;
pub mod postgres;
