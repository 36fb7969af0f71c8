use uuid::Uuid;

use crate::core::{AppError, Result, TenantId};
use crate::modules::enrollments::models::Enrollment;
use crate::modules::payments::models::Payment;
use crate::modules::schedules::models::PaymentScheduleEntry;
use crate::modules::schedules::repositories::ScheduleTx;

pub(crate) async fn enrollment_or_not_found(
    tx: &mut dyn ScheduleTx,
    tenant: &TenantId,
    id: Uuid,
) -> Result<Enrollment> {
    tx.find_enrollment(tenant, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Enrollment {}", id)))
}

pub(crate) async fn entry_or_not_found(
    tx: &mut dyn ScheduleTx,
    tenant: &TenantId,
    id: Uuid,
) -> Result<PaymentScheduleEntry> {
    tx.find_entry(tenant, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Schedule entry {}", id)))
}

pub(crate) async fn payment_or_not_found(
    tx: &mut dyn ScheduleTx,
    tenant: &TenantId,
    id: Uuid,
) -> Result<Payment> {
    tx.find_payment(tenant, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Payment {}", id)))
}
