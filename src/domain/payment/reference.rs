//! Payment reference: the idempotency key of a payment lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::foundation::ValidationError;

const MAX_REFERENCE_LEN: usize = 100;

/// Caller-visible unique reference shared with the gateway.
///
/// Immutable once a payment is created; the ledger enforces uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Validates an externally supplied reference.
    ///
    /// Gateways accept only alphanumerics plus `-`, `.`, `=` and `_`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::empty_field("reference"));
        }
        if value.len() > MAX_REFERENCE_LEN {
            return Err(ValidationError::out_of_range(
                "reference",
                1,
                MAX_REFERENCE_LEN as i64,
                value.len() as i64,
            ));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '=' | '_')))
        {
            return Err(ValidationError::invalid_format(
                "reference",
                format!("unsupported character '{}'", bad),
            ));
        }
        Ok(Self(value))
    }

    /// Generates a fresh reference as `{prefix}_{uuid}`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}_{}", prefix, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentReference {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PaymentReference::new(value)
    }
}

impl From<PaymentReference> for String {
    fn from(reference: PaymentReference) -> Self {
        reference.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_reference() {
        assert_eq!(PaymentReference::new("KM_1").unwrap().as_str(), "KM_1");
    }

    #[test]
    fn rejects_empty_and_spaces() {
        assert!(PaymentReference::new("").is_err());
        assert!(PaymentReference::new("KM 1").is_err());
    }

    #[test]
    fn rejects_overlong() {
        assert!(PaymentReference::new("x".repeat(101)).is_err());
    }

    #[test]
    fn generated_references_are_prefixed_and_unique() {
        let a = PaymentReference::generate("KM");
        let b = PaymentReference::generate("KM");
        assert!(a.as_str().starts_with("KM_"));
        assert_ne!(a, b);
        assert!(PaymentReference::new(a.as_str()).is_ok());
    }
}
