use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Currency, Result, TenantId};
use crate::modules::plans::models::PaymentType;
use crate::modules::plans::services::InstallmentSpec;

/// Persisted status of a schedule entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Paid,
    Failed,
    Overdue,
    Paused,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Overdue => "overdue",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Exhaustive transition table
    ///
    /// `paused -> paid` is accepted because a charge issued before the pause may still settle.
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Failed)
                | (Pending, Overdue)
                | (Pending, Paused)
                | (Pending, Cancelled)
                | (Failed, Pending)
                | (Failed, Overdue)
                | (Failed, Paid)
                | (Failed, Cancelled)
                | (Overdue, Pending)
                | (Overdue, Paid)
                | (Overdue, Failed)
                | (Overdue, Paused)
                | (Overdue, Cancelled)
                | (Paused, Pending)
                | (Paused, Paid)
                | (Paused, Cancelled)
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for ScheduleStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "overdue" => Ok(Self::Overdue),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid schedule status: {}", value)),
        }
    }
}

/// One due-date change, appended and never rewritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateAdjustment {
    pub old_date: NaiveDate,
    pub new_date: NaiveDate,
    pub reason: String,
    pub actor: String,
    pub adjusted_at: DateTime<Utc>,
}

/// One installment of an enrollment's payment schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub enrollment_id: Uuid,
    /// 1-based, unique per enrollment
    pub payment_number: i32,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: Currency,
    pub scheduled_date: NaiveDate,
    pub status: ScheduleStatus,
    /// Set only on the transition to `paid`
    pub paid_date: Option<DateTime<Utc>>,
    /// Charge reference returned by the gateway for the latest issuance
    pub external_invoice_ref: Option<String>,
    pub failed_attempts: i32,
    pub adjustment_history: Vec<DateAdjustment>,
    /// Bumped by the store on every successful update
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentScheduleEntry {
    pub fn from_spec(
        tenant_id: TenantId,
        enrollment_id: Uuid,
        currency: Currency,
        spec: &InstallmentSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            enrollment_id,
            payment_number: spec.payment_number,
            payment_type: spec.payment_type,
            amount: spec.amount,
            currency,
            scheduled_date: spec.due_date,
            status: ScheduleStatus::Pending,
            paid_date: None,
            external_invoice_ref: None,
            failed_attempts: 0,
            adjustment_history: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as seen at `today`
    ///
    /// A pending or failed entry past its date reads as overdue; a persisted overdue entry whose
    /// date was moved forward reads as pending again.
    pub fn effective_status(&self, today: NaiveDate) -> ScheduleStatus {
        match self.status {
            ScheduleStatus::Pending | ScheduleStatus::Failed if self.scheduled_date < today => {
                ScheduleStatus::Overdue
            }
            ScheduleStatus::Overdue if self.scheduled_date >= today => ScheduleStatus::Pending,
            status => status,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == ScheduleStatus::Paid
    }

    /// Move to `next`, rejecting transitions absent from the table
    pub fn transition(&mut self, next: ScheduleStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "Schedule entry {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next == ScheduleStatus::Paid {
            self.paid_date = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Reject unless the current status is one of `allowed`
    pub fn ensure_status(&self, allowed: &[ScheduleStatus], operation: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(AppError::conflict(format!(
                "Cannot {} schedule entry {} in status {}",
                operation, self.id, self.status
            )))
        }
    }

    /// Optimistic guard for admin operations carrying the version they last read
    pub fn ensure_version(&self, expected: Option<i32>) -> Result<()> {
        match expected {
            Some(v) if v != self.version => Err(AppError::conflict(format!(
                "Schedule entry {} was modified (expected version {}, found {})",
                self.id, v, self.version
            ))),
            _ => Ok(()),
        }
    }

    /// Change the due date and append the audit record
    pub fn reschedule(
        &mut self,
        new_date: NaiveDate,
        reason: impl Into<String>,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.adjustment_history.push(DateAdjustment {
            old_date: self.scheduled_date,
            new_date,
            reason: reason.into(),
            actor: actor.into(),
            adjusted_at: now,
        });
        self.scheduled_date = new_date;
        self.updated_at = now;
    }
}
