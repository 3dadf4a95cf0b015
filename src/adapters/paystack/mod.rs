//! Paystack payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for Paystack, including:
//! - Charge initialization and verification
//! - Refunds
//! - Webhook signature verification
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA512 with constant-time comparison
//! - The secret key is handled via `secrecy::SecretString`

mod mock_gateway;
mod paystack_adapter;
mod paystack_types;

pub use mock_gateway::{MockPaymentGateway, MOCK_WEBHOOK_SIGNATURE};
pub use paystack_adapter::{PaystackConfig, PaystackGateway};
pub use paystack_types::{decode_webhook_event, map_transaction_status};
