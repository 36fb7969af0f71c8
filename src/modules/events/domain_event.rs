use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::TenantId;

/// Notification emitted after a state change has been committed
///
/// Subscribers (audit log, customer notifications) are best-effort; the engine never waits on
/// or depends on their delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    #[serde(rename = "enrollment.schedule_created")]
    ScheduleCreated {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        invoice_number: String,
        entries: usize,
        total_amount: Decimal,
    },
    #[serde(rename = "schedule.adjusted")]
    ScheduleAdjusted {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        old_date: NaiveDate,
        new_date: NaiveDate,
        actor: String,
        reason: String,
    },
    #[serde(rename = "enrollment.payments_paused")]
    PaymentsPaused {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entries: usize,
        actor: String,
        reason: String,
    },
    #[serde(rename = "enrollment.payments_resumed")]
    PaymentsResumed {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entries: usize,
        actor: String,
        new_start_date: Option<NaiveDate>,
    },
    #[serde(rename = "enrollment.cancelled")]
    EnrollmentCancelled {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        cancelled_entries: usize,
        refund_amount: Decimal,
        actor: String,
    },
    #[serde(rename = "enrollment.completed")]
    EnrollmentCompleted {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        paid_amount: Decimal,
    },
    #[serde(rename = "payment.recorded")]
    PaymentRecorded {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        payment_method: String,
        actor: String,
    },
    #[serde(rename = "payment.settled")]
    PaymentSettled {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    #[serde(rename = "payment.failed")]
    PaymentFailed {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        payment_id: Uuid,
        attempts: i32,
        reason: Option<String>,
    },
    #[serde(rename = "payment.retries_exhausted")]
    RetriesExhausted {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        attempts: i32,
    },
    #[serde(rename = "payment.refunded")]
    PaymentRefunded {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        refunded_total: Decimal,
        external_refund_id: Option<String>,
    },
    #[serde(rename = "invoice.issued")]
    InvoiceIssued {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        charge_ref: String,
        amount: Decimal,
    },
    #[serde(rename = "invoice.issue_failed")]
    InvoiceIssueFailed {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        entry_id: Uuid,
        error: String,
    },
    #[serde(rename = "reconciliation.flagged")]
    ReconciliationFlagged {
        tenant_id: TenantId,
        event_id: String,
        charge_ref: String,
        detail: String,
        flagged_at: DateTime<Utc>,
    },
    #[serde(rename = "subscription.extended")]
    SubscriptionExtended {
        tenant_id: TenantId,
        enrollment_id: Uuid,
        added_entries: usize,
        total_amount: Decimal,
    },
}

impl DomainEvent {
    /// Wire name, e.g. `schedule.adjusted`
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScheduleCreated { .. } => "enrollment.schedule_created",
            Self::ScheduleAdjusted { .. } => "schedule.adjusted",
            Self::PaymentsPaused { .. } => "enrollment.payments_paused",
            Self::PaymentsResumed { .. } => "enrollment.payments_resumed",
            Self::EnrollmentCancelled { .. } => "enrollment.cancelled",
            Self::EnrollmentCompleted { .. } => "enrollment.completed",
            Self::PaymentRecorded { .. } => "payment.recorded",
            Self::PaymentSettled { .. } => "payment.settled",
            Self::PaymentFailed { .. } => "payment.failed",
            Self::RetriesExhausted { .. } => "payment.retries_exhausted",
            Self::PaymentRefunded { .. } => "payment.refunded",
            Self::InvoiceIssued { .. } => "invoice.issued",
            Self::InvoiceIssueFailed { .. } => "invoice.issue_failed",
            Self::ReconciliationFlagged { .. } => "reconciliation.flagged",
            Self::SubscriptionExtended { .. } => "subscription.extended",
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::ScheduleCreated { tenant_id, .. }
            | Self::ScheduleAdjusted { tenant_id, .. }
            | Self::PaymentsPaused { tenant_id, .. }
            | Self::PaymentsResumed { tenant_id, .. }
            | Self::EnrollmentCancelled { tenant_id, .. }
            | Self::EnrollmentCompleted { tenant_id, .. }
            | Self::PaymentRecorded { tenant_id, .. }
            | Self::PaymentSettled { tenant_id, .. }
            | Self::PaymentFailed { tenant_id, .. }
            | Self::RetriesExhausted { tenant_id, .. }
            | Self::PaymentRefunded { tenant_id, .. }
            | Self::InvoiceIssued { tenant_id, .. }
            | Self::InvoiceIssueFailed { tenant_id, .. }
            | Self::ReconciliationFlagged { tenant_id, .. }
            | Self::SubscriptionExtended { tenant_id, .. } => tenant_id,
        }
    }
}
