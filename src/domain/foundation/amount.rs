//! Money amounts in minor currency units.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Strictly positive amount in the currency's minor unit (kobo, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Creates an amount, rejecting zero and negative values.
    pub fn new(minor_units: i64) -> Result<Self, ValidationError> {
        if minor_units <= 0 {
            return Err(ValidationError::out_of_range(
                "amount",
                1,
                i64::MAX,
                minor_units,
            ));
        }
        Ok(Self(minor_units))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Splits into `parts` slices; the last slice absorbs the remainder.
    pub fn split(&self, parts: u32) -> Result<Vec<Amount>, ValidationError> {
        if parts == 0 || i64::from(parts) > self.0 {
            return Err(ValidationError::out_of_range(
                "parts",
                1,
                self.0,
                i64::from(parts),
            ));
        }
        let parts = i64::from(parts);
        let base = self.0 / parts;
        let remainder = self.0 % parts;
        Ok((0..parts)
            .map(|i| {
                if i == parts - 1 {
                    Amount(base + remainder)
                } else {
                    Amount(base)
                }
            })
            .collect())
    }
}

impl TryFrom<i64> for Amount {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
