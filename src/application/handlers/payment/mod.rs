//! Payment handlers.
//!
//! ## Commands
//! - Initializing payments and installment plans
//! - Charging installment slices
//! - Verifying and settling charges
//! - Processing gateway webhooks
//! - Reconciliation and dispatch retries
//!
//! ## Queries
//! - Payment history and pending payments

mod charge_installment;
mod create_installment_plan;
mod get_payment_history;
mod handle_gateway_webhook;
mod initialize_payment;
mod reconcile_payments;
mod verify_and_settle;

// Commands
pub use charge_installment::{
    ChargeInstallmentCommand, ChargeInstallmentHandler, ChargeInstallmentResult,
};
pub use create_installment_plan::{
    CreateInstallmentPlanCommand, CreateInstallmentPlanHandler, CreateInstallmentPlanResult,
    DEFAULT_INTERVAL_DAYS,
};
pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
};
pub use initialize_payment::{
    CheckoutSettings, InitializePaymentCommand, InitializePaymentHandler, InitializePaymentResult,
};
pub use reconcile_payments::{
    ReconcilePaymentsCommand, ReconcilePaymentsHandler, ReconcileReport, RetryDispatchCommand,
    RetryDispatchHandler,
};
pub use verify_and_settle::{VerifyAndSettleCommand, VerifyAndSettleHandler, VerifyAndSettleResult};

// Queries
pub use get_payment_history::{GetPaymentHistoryHandler, GetPaymentHistoryQuery};

pub(crate) use initialize_payment::authorize_charge;
