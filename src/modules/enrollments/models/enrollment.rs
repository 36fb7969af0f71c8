use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Currency, TenantId};
use crate::modules::plans::models::PlanTerms;

/// Aggregate payment status of an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for EnrollmentStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid enrollment status: {}", value)),
        }
    }
}

/// A user's enrollment in a product, with the plan snapshot its schedule was built from
///
/// `total_amount` and `paid_amount` are projections of the schedule entries and payments,
/// recomputed by `aggregates::refresh_totals` and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub product_id: String,
    /// Catalog plan the snapshot was taken from, if any
    pub payment_plan_id: Option<Uuid>,
    pub plan_version: Option<i32>,
    pub plan_snapshot: PlanTerms,
    pub price: Decimal,
    pub currency: Currency,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: EnrollmentStatus,
    pub invoice_number: String,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_cancelled(&self) -> bool {
        self.payment_status == EnrollmentStatus::Cancelled
    }
}
