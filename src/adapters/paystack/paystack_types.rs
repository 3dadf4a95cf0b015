//! Paystack wire types.
//!
//! Every Paystack response shares the `{status, message, data}` envelope.
//! Only the fields the settlement engine reads are modelled; the raw JSON is
//! kept alongside verify results for audit.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::ports::{GatewayError, GatewayWebhookEvent, ProviderStatus};

/// Standard Paystack response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEnvelope<T> {
    pub status: bool,

    #[serde(default)]
    pub message: String,

    pub data: Option<T>,
}

/// Body of `POST /transaction/initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeBody<'a> {
    pub email: &'a str,

    /// Paystack expects the amount as a string of minor units.
    pub amount: String,

    pub currency: &'a str,
    pub reference: &'a str,
    pub metadata: &'a serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeData {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// `data` of `GET /transaction/verify/{reference}`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyData {
    pub id: Option<i64>,
    pub status: String,
    pub reference: String,
    pub amount: i64,

    #[serde(default)]
    pub currency: String,

    #[serde(alias = "paidAt")]
    pub paid_at: Option<String>,

    pub gateway_response: Option<String>,
}

impl VerifyData {
    pub fn provider_status(&self) -> ProviderStatus {
        map_transaction_status(&self.status)
    }

    pub fn paid_at(&self) -> Option<Timestamp> {
        self.paid_at.as_deref().and_then(Timestamp::parse_rfc3339)
    }
}

/// Maps Paystack's transaction status word onto the three outcomes we act on.
///
/// Unknown words are treated as still pending so nothing is settled on them.
pub fn map_transaction_status(status: &str) -> ProviderStatus {
    match status {
        "success" => ProviderStatus::Success,
        "failed" | "reversed" | "abandoned" => ProviderStatus::Failed,
        _ => ProviderStatus::Pending,
    }
}

/// Body of `POST /refund`.
#[derive(Debug, Clone, Serialize)]
pub struct RefundBody<'a> {
    pub transaction: &'a str,
    pub amount: i64,

    #[serde(rename = "merchant_note")]
    pub reason: &'a str,
}

/// Raw webhook envelope: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackWebhookEnvelope {
    pub event: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Extracts the refund reference Paystack uses for a refund object.
///
/// Refund payloads carry one of `reference`, `refund_reference` or a numeric `id`.
pub fn refund_reference_of(data: &serde_json::Value) -> Option<String> {
    ["reference", "refund_reference"]
        .iter()
        .find_map(|key| data.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        .or_else(|| match data.get("id") {
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        })
}

/// Decodes an already-authenticated webhook body into a gateway event.
pub fn decode_webhook_event(payload: &[u8]) -> Result<GatewayWebhookEvent, GatewayError> {
    let envelope: PaystackWebhookEnvelope = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::invalid_webhook(format!("Invalid JSON: {}", e)))?;

    match envelope.event.as_str() {
        "charge.success" => {
            let reference = envelope
                .data
                .get("reference")
                .and_then(|v| v.as_str())
                .ok_or_else(|| GatewayError::invalid_webhook("charge.success without reference"))?;
            Ok(GatewayWebhookEvent::ChargeSuccess {
                reference: reference.to_string(),
            })
        }
        "refund.processed" => {
            let provider_refund_reference = refund_reference_of(&envelope.data)
                .ok_or_else(|| GatewayError::invalid_webhook("refund.processed without reference"))?;
            Ok(GatewayWebhookEvent::RefundProcessed {
                provider_refund_reference,
            })
        }
        "refund.failed" => {
            let provider_refund_reference = refund_reference_of(&envelope.data)
                .ok_or_else(|| GatewayError::invalid_webhook("refund.failed without reference"))?;
            let reason = envelope
                .data
                .get("merchant_note")
                .or_else(|| envelope.data.get("status"))
                .and_then(|v| v.as_str())
                .unwrap_or("refund failed at provider")
                .to_string();
            Ok(GatewayWebhookEvent::RefundFailed {
                provider_refund_reference,
                reason,
            })
        }
        other => Ok(GatewayWebhookEvent::Other {
            event: other.to_string(),
        }),
    }
}

/// Decode a hex string to bytes.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Encode bytes to hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
