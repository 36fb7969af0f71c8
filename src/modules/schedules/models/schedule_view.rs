use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::schedule_entry::{PaymentScheduleEntry, ScheduleStatus};
use crate::modules::enrollments::models::Enrollment;
use crate::modules::payments::models::Payment;

/// Entry as presented to callers, with overdue derived at read time
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntryView {
    #[serde(flatten)]
    pub entry: PaymentScheduleEntry,
    pub effective_status: ScheduleStatus,
}

/// Enrollment with its full schedule and payment history
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub enrollment: Enrollment,
    pub entries: Vec<ScheduleEntryView>,
    pub payments: Vec<Payment>,
}

impl ScheduleView {
    pub fn new(
        enrollment: Enrollment,
        entries: Vec<PaymentScheduleEntry>,
        payments: Vec<Payment>,
        today: NaiveDate,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| ScheduleEntryView {
                effective_status: entry.effective_status(today),
                entry,
            })
            .collect();
        Self {
            enrollment,
            entries,
            payments,
        }
    }

    pub fn entry(&self, payment_number: i32) -> Option<&ScheduleEntryView> {
        self.entries
            .iter()
            .find(|e| e.entry.payment_number == payment_number)
    }
}

/// A refund the cancellation could not complete; retry it through `refund_payment`
#[derive(Debug, Clone, Serialize)]
pub struct PendingRefund {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub enrollment: Enrollment,
    pub cancelled_entries: usize,
    pub refunded_amount: Decimal,
    pub pending_refunds: Vec<PendingRefund>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverdueRefreshSummary {
    pub marked_overdue: usize,
    pub restored_pending: usize,
    pub skipped: usize,
}
