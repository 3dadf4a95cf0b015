//! In-memory adapters for tests and local development.
//!
//! Not persistent. Status writes emulate the compare-and-swap contract of
//! the PostgreSQL adapters under a single lock.

mod in_memory_collaborators;
mod in_memory_ledger;
mod in_memory_refunds;

pub use in_memory_collaborators::{
    InMemoryApplicationStore, InMemoryEnrollmentStore, InMemoryUserDirectory,
};
pub use in_memory_ledger::InMemoryPaymentLedger;
pub use in_memory_refunds::InMemoryRefundRepository;
