use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::{AppError, Currency, Result};
use crate::modules::plans::models::PlanTerms;

/// Input to `ScheduleManager::create_enrollment_schedule`
///
/// `enrollment_id` is chosen by the caller so that retries land on the same enrollment.
/// When both `plan` and `payment_plan_id` are given the embedded terms win and the reference
/// is kept for reporting.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSchedule {
    pub enrollment_id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub price: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub payment_plan_id: Option<Uuid>,
    #[serde(default)]
    pub plan: Option<PlanTerms>,
    /// Defaults to today
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustDate {
    pub new_date: NaiveDate,
    pub reason: String,
    pub actor: String,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PauseEnrollment {
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeEnrollment {
    pub actor: String,
    /// Shift every paused entry so the earliest one falls on this date
    #[serde(default)]
    pub new_start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelEnrollment {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub refund_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualPayment {
    /// `bank_transfer`, `cash` or any other label
    pub payment_method: String,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    pub actor: String,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminRefund {
    pub amount: Decimal,
    #[serde(default)]
    pub reason: Option<String>,
    pub actor: String,
}

/// Validates a free-text actor or reason field
pub(crate) fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(())
}
