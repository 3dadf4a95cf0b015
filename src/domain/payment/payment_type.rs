use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a payment is for. Selects the side effect applied once it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    ApplicationFee,
    Tuition,
    Installment,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::ApplicationFee => "APPLICATION_FEE",
            PaymentType::Tuition => "TUITION",
            PaymentType::Installment => "INSTALLMENT",
        }
    }

    /// Tuition and installment payments cannot exist without a course.
    pub fn requires_course(&self) -> bool {
        matches!(self, PaymentType::Tuition | PaymentType::Installment)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPLICATION_FEE" => Ok(PaymentType::ApplicationFee),
            "TUITION" => Ok(PaymentType::Tuition),
            "INSTALLMENT" => Ok(PaymentType::Installment),
            other => Err(format!("Unknown payment type: {}", other)),
        }
    }
}
