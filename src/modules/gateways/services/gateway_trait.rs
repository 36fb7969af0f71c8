use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};

/// Payment gateway seam: charge and refund calls plus webhook verification
///
/// Charge and refund calls are made outside any store transaction.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a charge and return the gateway's charge reference
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse>;

    /// Refund part or all of a charge and return the gateway's refund reference
    async fn create_refund(&self, request: RefundRequest) -> Result<RefundResponse>;

    /// Check the signature header against the raw webhook body
    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> bool;

    /// Decode a verified webhook body
    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent> {
        serde_json::from_slice(payload)
            .map_err(|e| AppError::validation(format!("Invalid webhook payload: {}", e)))
    }

    /// Get gateway name
    fn name(&self) -> &str;
}

/// Charge request for one schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub currency: Currency,
    /// Customer the charge is billed to (the enrollment's user)
    pub customer_ref: String,
    pub description: String,
    /// Stable per issuance attempt so transport retries never double-charge
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub charge_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub charge_ref: String,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    pub refund_ref: String,
}

/// Kind of asynchronous gateway notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEventType {
    #[serde(rename = "charge.succeeded")]
    ChargeSucceeded,
    #[serde(rename = "charge.failed")]
    ChargeFailed,
    #[serde(rename = "refund.issued")]
    RefundIssued,
}

impl GatewayEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeSucceeded => "charge.succeeded",
            Self::ChargeFailed => "charge.failed",
            Self::RefundIssued => "refund.issued",
        }
    }
}

impl std::fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook payload delivered by the gateway, at least once and in no guaranteed order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Stable event id, the idempotency key for processing
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: GatewayEventType,
    pub charge_ref: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    /// Present on refund events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GatewayEvent {
    /// Key a refund is deduplicated by: the gateway's refund reference, else the event id
    pub fn refund_key(&self) -> &str {
        self.refund_ref.as_deref().unwrap_or(&self.id)
    }
}
