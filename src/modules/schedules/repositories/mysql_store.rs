use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use uuid::Uuid;

use super::store::{ScheduleStore, ScheduleTx};
use crate::core::{AppError, Currency, Result, TenantId};
use crate::modules::enrollments::models::{Enrollment, EnrollmentStatus};
use crate::modules::payments::models::{Payment, PaymentMethod, PaymentStatus};
use crate::modules::plans::models::{PaymentPlan, PaymentType};
use crate::modules::schedules::models::{PaymentScheduleEntry, ScheduleStatus};
use crate::modules::settlements::models::{WebhookEventRecord, WebhookEventStatus};

/// MySQL-backed store; one `ScheduleTx` is one InnoDB transaction
#[derive(Clone)]
pub struct MySqlScheduleStore {
    pool: MySqlPool,
}

impl MySqlScheduleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for MySqlScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx }))
    }
}

struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

impl MySqlTx {
    /// Entries of the given enrollments visible to this transaction
    async fn count_entries(&mut self, enrollments: &[Uuid]) -> Result<u64> {
        let mut total = 0;
        for id in enrollments {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM payment_schedules WHERE enrollment_id = ?")
                    .bind(id.to_string())
                    .fetch_one(&mut *self.tx)
                    .await?;
            total += u64::try_from(count).unwrap_or_default();
        }
        Ok(total)
    }
}

const PLAN_COLUMNS: &str = "id, tenant_id, name, terms, version, created_at, updated_at";

const ENROLLMENT_COLUMNS: &str = "id, tenant_id, user_id, product_id, payment_plan_id, \
     plan_version, plan_snapshot, price, currency, total_amount, paid_amount, payment_status, \
     invoice_number, start_date, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, tenant_id, enrollment_id, payment_number, payment_type, amount, \
     currency, scheduled_date, status, paid_date, external_invoice_ref, failed_attempts, \
     adjustment_history, version, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, tenant_id, enrollment_id, schedule_entry_id, amount, currency, \
     status, external_charge_id, payment_method, transaction_reference, refunded_amount, \
     refunded_at, refund_reason, refund_history, processed_events, paid_at, created_at, updated_at";

const WEBHOOK_COLUMNS: &str = "tenant_id, payload, status, detail, received_at, processed_at";

#[async_trait]
impl ScheduleTx for MySqlTx {
    async fn insert_plan(&mut self, plan: &PaymentPlan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_plans (
                id, tenant_id, name, plan_type, terms, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.id.to_string())
        .bind(plan.tenant_id.as_str())
        .bind(&plan.name)
        .bind(plan.terms.plan_type())
        .bind(serde_json::to_string(&plan.terms)?)
        .bind(plan.version)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_plan(&mut self, plan: &PaymentPlan) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE payment_plans
            SET name = ?, plan_type = ?, terms = ?, version = ?, updated_at = ?
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(&plan.name)
        .bind(plan.terms.plan_type())
        .bind(serde_json::to_string(&plan.terms)?)
        .bind(plan.version)
        .bind(plan.updated_at)
        .bind(plan.id.to_string())
        .bind(plan.tenant_id.as_str())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(format!("Plan {}", plan.id)));
        }
        Ok(())
    }

    async fn find_plan(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<PaymentPlan>> {
        let sql = format!(
            "SELECT {} FROM payment_plans WHERE id = ? AND tenant_id = ? FOR UPDATE",
            PLAN_COLUMNS
        );
        let row = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(id.to_string())
            .bind(tenant.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(PaymentPlan::try_from).transpose()
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (
                id, tenant_id, user_id, product_id, payment_plan_id, plan_version,
                plan_snapshot, price, currency, total_amount, paid_amount, payment_status,
                invoice_number, start_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(enrollment.id.to_string())
        .bind(enrollment.tenant_id.as_str())
        .bind(&enrollment.user_id)
        .bind(&enrollment.product_id)
        .bind(enrollment.payment_plan_id.map(|id| id.to_string()))
        .bind(enrollment.plan_version)
        .bind(serde_json::to_string(&enrollment.plan_snapshot)?)
        .bind(enrollment.price)
        .bind(enrollment.currency.as_str())
        .bind(enrollment.total_amount)
        .bind(enrollment.paid_amount)
        .bind(enrollment.payment_status.as_str())
        .bind(&enrollment.invoice_number)
        .bind(enrollment.start_date)
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_as_conflict(e, "Enrollment already exists"))?;
        Ok(())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE enrollments
            SET total_amount = ?, paid_amount = ?, payment_status = ?, updated_at = ?
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(enrollment.total_amount)
        .bind(enrollment.paid_amount)
        .bind(enrollment.payment_status.as_str())
        .bind(enrollment.updated_at)
        .bind(enrollment.id.to_string())
        .bind(enrollment.tenant_id.as_str())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(format!("Enrollment {}", enrollment.id)));
        }
        Ok(())
    }

    async fn find_enrollment(
        &mut self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE id = ? AND tenant_id = ? FOR UPDATE",
            ENROLLMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id.to_string())
            .bind(tenant.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn upsert_entries(&mut self, entries: &[PaymentScheduleEntry]) -> Result<u64> {
        let mut enrollments: Vec<Uuid> = entries.iter().map(|e| e.enrollment_id).collect();
        enrollments.sort();
        enrollments.dedup();

        // sqlx negotiates CLIENT_FOUND_ROWS, so rows_affected counts existing numbers too.
        let before = self.count_entries(&enrollments).await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO payment_schedules (
                    id, tenant_id, enrollment_id, payment_number, payment_type, amount,
                    currency, scheduled_date, status, paid_date, external_invoice_ref,
                    failed_attempts, adjustment_history, version, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON DUPLICATE KEY UPDATE id = id
                "#,
            )
            .bind(entry.id.to_string())
            .bind(entry.tenant_id.as_str())
            .bind(entry.enrollment_id.to_string())
            .bind(entry.payment_number)
            .bind(entry.payment_type.as_str())
            .bind(entry.amount)
            .bind(entry.currency.as_str())
            .bind(entry.scheduled_date)
            .bind(entry.status.as_str())
            .bind(entry.paid_date)
            .bind(&entry.external_invoice_ref)
            .bind(entry.failed_attempts)
            .bind(serde_json::to_string(&entry.adjustment_history)?)
            .bind(entry.version)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut *self.tx)
            .await?;
        }
        let after = self.count_entries(&enrollments).await?;
        Ok(after.saturating_sub(before))
    }

    async fn find_entry(
        &mut self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>> {
        let sql = format!(
            "SELECT {} FROM payment_schedules WHERE id = ? AND tenant_id = ? FOR UPDATE",
            ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.to_string())
            .bind(tenant.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(PaymentScheduleEntry::try_from).transpose()
    }

    async fn find_entries(
        &mut self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let sql = format!(
            "SELECT {} FROM payment_schedules \
             WHERE enrollment_id = ? AND tenant_id = ? \
             ORDER BY payment_number ASC FOR UPDATE",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(enrollment_id.to_string())
            .bind(tenant.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(PaymentScheduleEntry::try_from).collect()
    }

    async fn find_due_entries(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let sql = format!(
            "SELECT {} FROM payment_schedules \
             WHERE tenant_id = ? AND status IN ('pending', 'overdue') AND scheduled_date <= ? \
             ORDER BY scheduled_date ASC, payment_number ASC LIMIT ?",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(tenant.as_str())
            .bind(as_of)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(PaymentScheduleEntry::try_from).collect()
    }

    async fn find_overdue_candidates(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let sql = format!(
            "SELECT {} FROM payment_schedules \
             WHERE tenant_id = ? \
               AND ((status IN ('pending', 'failed') AND scheduled_date < ?) \
                 OR (status = 'overdue' AND scheduled_date >= ?)) \
             ORDER BY scheduled_date ASC, payment_number ASC LIMIT ?",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(tenant.as_str())
            .bind(as_of)
            .bind(as_of)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(PaymentScheduleEntry::try_from).collect()
    }

    async fn update_entry(&mut self, entry: &mut PaymentScheduleEntry) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE payment_schedules
            SET amount = ?, scheduled_date = ?, status = ?, paid_date = ?,
                external_invoice_ref = ?, failed_attempts = ?, adjustment_history = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND tenant_id = ? AND version = ?
            "#,
        )
        .bind(entry.amount)
        .bind(entry.scheduled_date)
        .bind(entry.status.as_str())
        .bind(entry.paid_date)
        .bind(&entry.external_invoice_ref)
        .bind(entry.failed_attempts)
        .bind(serde_json::to_string(&entry.adjustment_history)?)
        .bind(entry.updated_at)
        .bind(entry.id.to_string())
        .bind(entry.tenant_id.as_str())
        .bind(entry.version)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::conflict(format!(
                "Schedule entry {} was modified concurrently",
                entry.id
            )));
        }
        entry.version += 1;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, tenant_id, enrollment_id, schedule_entry_id, amount, currency, status,
                external_charge_id, payment_method, transaction_reference, refunded_amount,
                refunded_at, refund_reason, refund_history, processed_events, paid_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(payment.tenant_id.as_str())
        .bind(payment.enrollment_id.to_string())
        .bind(payment.schedule_entry_id.to_string())
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.external_charge_id)
        .bind(payment.payment_method.as_str())
        .bind(&payment.transaction_reference)
        .bind(payment.refunded_amount)
        .bind(payment.refunded_at)
        .bind(&payment.refund_reason)
        .bind(serde_json::to_string(&payment.refund_history)?)
        .bind(serde_json::to_string(&payment.processed_events)?)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_as_conflict(e, "Charge is already recorded"))?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, refunded_amount = ?, refunded_at = ?, refund_reason = ?,
                refund_history = ?, processed_events = ?, paid_at = ?, updated_at = ?
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(payment.status.as_str())
        .bind(payment.refunded_amount)
        .bind(payment.refunded_at)
        .bind(&payment.refund_reason)
        .bind(serde_json::to_string(&payment.refund_history)?)
        .bind(serde_json::to_string(&payment.processed_events)?)
        .bind(payment.paid_at)
        .bind(payment.updated_at)
        .bind(payment.id.to_string())
        .bind(payment.tenant_id.as_str())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(format!("Payment {}", payment.id)));
        }
        Ok(())
    }

    async fn find_payment(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE id = ? AND tenant_id = ? FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id.to_string())
            .bind(tenant.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_charge(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE tenant_id = ? AND external_charge_id = ? FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(tenant.as_str())
            .bind(charge_ref)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_payments(
        &mut self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE tenant_id = ? AND enrollment_id = ? \
             ORDER BY created_at ASC, id ASC FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(tenant.as_str())
            .bind(enrollment_id.to_string())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn claim_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<WebhookEventRecord> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                tenant_id, event_id, event_type, charge_ref, payload, status, detail,
                received_at, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE event_id = event_id
            "#,
        )
        .bind(record.tenant_id.as_str())
        .bind(record.event_id())
        .bind(record.event.event_type.as_str())
        .bind(&record.event.charge_ref)
        .bind(serde_json::to_string(&record.event)?)
        .bind(record.status.as_str())
        .bind(&record.detail)
        .bind(record.received_at)
        .bind(record.processed_at)
        .execute(&mut *self.tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM webhook_events WHERE tenant_id = ? AND event_id = ? FOR UPDATE",
            WEBHOOK_COLUMNS
        );
        let row = sqlx::query_as::<_, WebhookRow>(&sql)
            .bind(record.tenant_id.as_str())
            .bind(record.event_id())
            .fetch_one(&mut *self.tx)
            .await?;
        WebhookEventRecord::try_from(row)
    }

    async fn save_webhook_event(&mut self, record: &WebhookEventRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = ?, detail = ?, processed_at = ?
            WHERE tenant_id = ? AND event_id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(&record.detail)
        .bind(record.processed_at)
        .bind(record.tenant_id.as_str())
        .bind(record.event_id())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_deferred_events(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Vec<WebhookEventRecord>> {
        let sql = format!(
            "SELECT {} FROM webhook_events \
             WHERE tenant_id = ? AND charge_ref = ? AND status = 'deferred' \
             ORDER BY received_at ASC, event_id ASC FOR UPDATE",
            WEBHOOK_COLUMNS
        );
        let rows = sqlx::query_as::<_, WebhookRow>(&sql)
            .bind(tenant.as_str())
            .bind(charge_ref)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(WebhookEventRecord::try_from).collect()
    }

    async fn next_invoice_counter(&mut self, tenant: &TenantId) -> Result<i64> {
        // LAST_INSERT_ID(expr) makes the new value readable on this connection only
        sqlx::query(
            r#"
            INSERT INTO invoice_counters (tenant_id, last_value)
            VALUES (?, LAST_INSERT_ID(1))
            ON DUPLICATE KEY UPDATE last_value = LAST_INSERT_ID(last_value + 1)
            "#,
        )
        .bind(tenant.as_str())
        .execute(&mut *self.tx)
        .await?;

        let value: u64 = sqlx::query_scalar("SELECT LAST_INSERT_ID()")
            .fetch_one(&mut *self.tx)
            .await?;
        i64::try_from(value).map_err(|_| AppError::internal("Invoice counter overflow"))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn unique_as_conflict(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(message),
        _ => AppError::Database(err),
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::internal(format!("Invalid id {}: {}", value, e)))
}

fn parse_currency(value: String) -> Result<Currency> {
    Currency::try_from(value).map_err(AppError::internal)
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    tenant_id: String,
    name: String,
    terms: String,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for PaymentPlan {
    type Error = AppError;

    fn try_from(row: PlanRow) -> Result<Self> {
        Ok(PaymentPlan {
            id: parse_uuid(&row.id)?,
            tenant_id: TenantId::new(row.tenant_id)?,
            name: row.name,
            terms: serde_json::from_str(&row.terms)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: String,
    tenant_id: String,
    user_id: String,
    product_id: String,
    payment_plan_id: Option<String>,
    plan_version: Option<i32>,
    plan_snapshot: String,
    price: Decimal,
    currency: String,
    total_amount: Decimal,
    paid_amount: Decimal,
    payment_status: String,
    invoice_number: String,
    start_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = AppError;

    fn try_from(row: EnrollmentRow) -> Result<Self> {
        Ok(Enrollment {
            id: parse_uuid(&row.id)?,
            tenant_id: TenantId::new(row.tenant_id)?,
            user_id: row.user_id,
            product_id: row.product_id,
            payment_plan_id: row.payment_plan_id.as_deref().map(parse_uuid).transpose()?,
            plan_version: row.plan_version,
            plan_snapshot: serde_json::from_str(&row.plan_snapshot)?,
            price: row.price,
            currency: parse_currency(row.currency)?,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            payment_status: EnrollmentStatus::try_from(row.payment_status)
                .map_err(AppError::internal)?,
            invoice_number: row.invoice_number,
            start_date: row.start_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    tenant_id: String,
    enrollment_id: String,
    payment_number: i32,
    payment_type: String,
    amount: Decimal,
    currency: String,
    scheduled_date: NaiveDate,
    status: String,
    paid_date: Option<DateTime<Utc>>,
    external_invoice_ref: Option<String>,
    failed_attempts: i32,
    adjustment_history: String,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for PaymentScheduleEntry {
    type Error = AppError;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(PaymentScheduleEntry {
            id: parse_uuid(&row.id)?,
            tenant_id: TenantId::new(row.tenant_id)?,
            enrollment_id: parse_uuid(&row.enrollment_id)?,
            payment_number: row.payment_number,
            payment_type: row
                .payment_type
                .parse::<PaymentType>()
                .map_err(AppError::internal)?,
            amount: row.amount,
            currency: parse_currency(row.currency)?,
            scheduled_date: row.scheduled_date,
            status: ScheduleStatus::try_from(row.status).map_err(AppError::internal)?,
            paid_date: row.paid_date,
            external_invoice_ref: row.external_invoice_ref,
            failed_attempts: row.failed_attempts,
            adjustment_history: serde_json::from_str(&row.adjustment_history)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    tenant_id: String,
    enrollment_id: String,
    schedule_entry_id: String,
    amount: Decimal,
    currency: String,
    status: String,
    external_charge_id: Option<String>,
    payment_method: String,
    transaction_reference: Option<String>,
    refunded_amount: Decimal,
    refunded_at: Option<DateTime<Utc>>,
    refund_reason: Option<String>,
    refund_history: String,
    processed_events: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            tenant_id: TenantId::new(row.tenant_id)?,
            enrollment_id: parse_uuid(&row.enrollment_id)?,
            schedule_entry_id: parse_uuid(&row.schedule_entry_id)?,
            amount: row.amount,
            currency: parse_currency(row.currency)?,
            status: PaymentStatus::try_from(row.status).map_err(AppError::internal)?,
            external_charge_id: row.external_charge_id,
            payment_method: PaymentMethod::parse(&row.payment_method),
            transaction_reference: row.transaction_reference,
            refunded_amount: row.refunded_amount,
            refunded_at: row.refunded_at,
            refund_reason: row.refund_reason,
            refund_history: serde_json::from_str(&row.refund_history)?,
            processed_events: serde_json::from_str(&row.processed_events)?,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    tenant_id: String,
    payload: String,
    status: String,
    detail: Option<String>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookRow> for WebhookEventRecord {
    type Error = AppError;

    fn try_from(row: WebhookRow) -> Result<Self> {
        Ok(WebhookEventRecord {
            tenant_id: TenantId::new(row.tenant_id)?,
            event: serde_json::from_str(&row.payload)?,
            status: WebhookEventStatus::try_from(row.status).map_err(AppError::internal)?,
            detail: row.detail,
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}
