use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::TenantId;
use crate::modules::gateways::GatewayEvent;

/// Processing state of a received gateway event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    /// Claimed but its business effect not yet committed
    Received,
    Processed,
    /// Refund seen before the charge settled; replayed once it does
    Deferred,
    NeedsReview,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Deferred => "deferred",
            Self::NeedsReview => "needs_review",
        }
    }

    /// A delivery of an event already in this state changes nothing
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Received)
    }
}

impl std::fmt::Display for WebhookEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for WebhookEventStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "received" => Ok(Self::Received),
            "processed" => Ok(Self::Processed),
            "deferred" => Ok(Self::Deferred),
            "needs_review" => Ok(Self::NeedsReview),
            _ => Err(format!("Invalid webhook event status: {}", value)),
        }
    }
}

/// Ledger row for one gateway event id within a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub tenant_id: TenantId,
    pub event: GatewayEvent,
    pub status: WebhookEventStatus,
    /// Why the event was deferred or flagged
    pub detail: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEventRecord {
    pub fn received(tenant_id: TenantId, event: GatewayEvent, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            event,
            status: WebhookEventStatus::Received,
            detail: None,
            received_at: now,
            processed_at: None,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event.id
    }

    pub fn finish(
        &mut self,
        status: WebhookEventStatus,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.detail = detail;
        self.processed_at = Some(now);
    }
}
