//! Payment gateway configuration (Paystack)

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::paystack::PaystackConfig;
use crate::application::handlers::CheckoutSettings;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Paystack secret key. Also keys webhook signatures.
    pub secret_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Where the provider returns the payer after checkout
    pub callback_url: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Prefix of generated payment references (`KM` gives `KM_...`)
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.secret_key.starts_with("sk_live_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn paystack(&self) -> PaystackConfig {
        PaystackConfig::new(self.secret_key.clone())
            .with_base_url(self.base_url.clone())
            .with_timeout(self.timeout())
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.currency.clone(),
            reference_prefix: self.reference_prefix.clone(),
            callback_url: self.callback_url.clone(),
        }
    }

    /// `production` demands a live key.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.secret_key.is_empty() {
            return Err(ValidationError::MissingRequired("gateway.secret_key"));
        }
        if !self.is_test_mode() && !self.is_live_mode() {
            return Err(ValidationError::InvalidGatewayKey);
        }
        if production && !self.is_live_mode() {
            return Err(ValidationError::TestKeyInProduction);
        }
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency);
        }
        if self.reference_prefix.is_empty()
            || self.reference_prefix.len() > 10
            || !self.reference_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidReferencePrefix);
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout("gateway.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: default_base_url(),
            callback_url: None,
            currency: default_currency(),
            reference_prefix: default_reference_prefix(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_reference_prefix() -> String {
    "KM".to_string()
}

fn default_timeout() -> u64 {
    30
}
