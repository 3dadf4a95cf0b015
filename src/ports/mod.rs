//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentGateway` - Charge initialization, verification, refunds, webhooks
//! - `PaymentLedger` - Payment persistence with CAS status writes
//! - `RefundRepository` - Refund persistence with the open-refund guard
//! - `EnrollmentStore`, `ApplicationStore`, `UserDirectory` - Collaborator tables

mod collaborators;
mod payment_gateway;
mod payment_ledger;
mod refund_repository;

pub use collaborators::{ApplicationStore, EnrollmentRecord, EnrollmentStore, UserDirectory};
pub use payment_gateway::{
    GatewayError, GatewayErrorCode, GatewayWebhookEvent, InitializeChargeRequest,
    InitializedCharge, PaymentGateway, ProviderStatus, RefundChargeRequest, RefundOutcome,
    VerifiedCharge,
};
pub use payment_ledger::{PaymentLedger, TransitionOutcome};
pub use refund_repository::{InsertRefundResult, RefundRepository};
