use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::core::{Result, TenantId};
use crate::modules::enrollments::models::Enrollment;
use crate::modules::payments::models::Payment;
use crate::modules::plans::models::PaymentPlan;
use crate::modules::schedules::models::PaymentScheduleEntry;
use crate::modules::settlements::models::WebhookEventRecord;

/// Transactional persistence for plans, enrollments, schedule entries, payments,
/// webhook events and invoice counters
///
/// Every mutation in the engine runs inside one `ScheduleTx`. Lookups documented as locking
/// hold the row until commit or rollback. A lock wait that ends in a deadlock surfaces as
/// `AppError::Database` with nothing applied, so the operation can simply be retried.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>>;
}

/// One open transaction; dropping it without `commit` rolls everything back
#[async_trait]
pub trait ScheduleTx: Send {
    async fn insert_plan(&mut self, plan: &PaymentPlan) -> Result<()>;

    async fn update_plan(&mut self, plan: &PaymentPlan) -> Result<()>;

    /// Locking
    async fn find_plan(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<PaymentPlan>>;

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<()>;

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> Result<()>;

    /// Locking
    async fn find_enrollment(&mut self, tenant: &TenantId, id: Uuid)
        -> Result<Option<Enrollment>>;

    /// Insert entries whose `(enrollment_id, payment_number)` is not yet present
    ///
    /// Returns how many rows were actually inserted.
    async fn upsert_entries(&mut self, entries: &[PaymentScheduleEntry]) -> Result<u64>;

    /// Locking
    async fn find_entry(
        &mut self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>>;

    /// All entries of an enrollment ordered by `payment_number`; locking
    async fn find_entries(
        &mut self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<Vec<PaymentScheduleEntry>>;

    /// Pending or overdue entries due on or before `as_of`, oldest first; not locking
    async fn find_due_entries(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>>;

    /// Entries whose persisted overdue flag disagrees with `as_of`; not locking
    async fn find_overdue_candidates(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>>;

    /// Compare-and-set on `entry.version`
    ///
    /// On success the stored version and `entry.version` are both incremented. A stale version
    /// yields `AppError::Conflict`.
    async fn update_entry(&mut self, entry: &mut PaymentScheduleEntry) -> Result<()>;

    /// Fails with `AppError::Conflict` if the external charge id is already recorded
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Locking
    async fn find_payment(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<Payment>>;

    /// Locking
    async fn find_payment_by_charge(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Option<Payment>>;

    /// All payments of an enrollment, oldest first; locking
    async fn find_payments(&mut self, tenant: &TenantId, enrollment_id: Uuid)
        -> Result<Vec<Payment>>;

    /// Insert the record unless `(tenant, event id)` exists, then return the stored row locked
    async fn claim_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<WebhookEventRecord>;

    async fn save_webhook_event(&mut self, record: &WebhookEventRecord) -> Result<()>;

    /// Deferred events for a charge in arrival order; locking
    async fn find_deferred_events(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Vec<WebhookEventRecord>>;

    /// Atomically increment and return the tenant's invoice counter
    async fn next_invoice_counter(&mut self, tenant: &TenantId) -> Result<i64>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
