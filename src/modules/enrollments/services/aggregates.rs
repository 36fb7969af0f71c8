use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::Result;
use crate::modules::enrollments::models::{Enrollment, EnrollmentStatus};
use crate::modules::payments::models::Payment;
use crate::modules::schedules::models::{PaymentScheduleEntry, ScheduleStatus};
use crate::modules::schedules::repositories::ScheduleTx;

/// What a totals refresh changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsChange {
    pub previous_status: EnrollmentStatus,
    pub status: EnrollmentStatus,
}

impl TotalsChange {
    pub fn completed(&self) -> bool {
        self.status == EnrollmentStatus::Completed
            && self.previous_status != EnrollmentStatus::Completed
    }
}

/// Recompute `total_amount`, `paid_amount` and the derived status from entries and payments
///
/// Paused and cancelled enrollments keep their status; only the amounts move.
pub fn recompute(
    enrollment: &mut Enrollment,
    entries: &[PaymentScheduleEntry],
    payments: &[Payment],
    now: DateTime<Utc>,
) -> TotalsChange {
    let previous_status = enrollment.payment_status;

    let total: Decimal = entries
        .iter()
        .filter(|e| e.status != ScheduleStatus::Cancelled)
        .map(|e| e.amount)
        .sum();
    let paid: Decimal = payments.iter().map(Payment::net_amount).sum();

    let live: Vec<_> = entries
        .iter()
        .filter(|e| e.status != ScheduleStatus::Cancelled)
        .collect();
    let all_paid = !live.is_empty() && live.iter().all(|e| e.is_paid());

    enrollment.total_amount = total;
    enrollment.paid_amount = paid;
    enrollment.payment_status = match previous_status {
        EnrollmentStatus::Paused | EnrollmentStatus::Cancelled => previous_status,
        _ if all_paid => EnrollmentStatus::Completed,
        EnrollmentStatus::Pending if paid > Decimal::ZERO => EnrollmentStatus::Active,
        EnrollmentStatus::Completed => EnrollmentStatus::Active,
        status => status,
    };
    enrollment.updated_at = now;

    TotalsChange {
        previous_status,
        status: enrollment.payment_status,
    }
}

/// Reload the enrollment's entries and payments inside `tx`, recompute, and persist
pub async fn refresh_totals(
    tx: &mut dyn ScheduleTx,
    enrollment: &mut Enrollment,
    now: DateTime<Utc>,
) -> Result<TotalsChange> {
    let entries = tx
        .find_entries(&enrollment.tenant_id, enrollment.id)
        .await?;
    let payments = tx
        .find_payments(&enrollment.tenant_id, enrollment.id)
        .await?;

    let change = recompute(enrollment, &entries, &payments, now);
    tx.update_enrollment(enrollment).await?;

    Ok(change)
}
