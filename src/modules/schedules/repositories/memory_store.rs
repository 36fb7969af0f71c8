use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{ScheduleStore, ScheduleTx};
use crate::core::{AppError, Result, TenantId};
use crate::modules::enrollments::models::Enrollment;
use crate::modules::payments::models::Payment;
use crate::modules::plans::models::PaymentPlan;
use crate::modules::schedules::models::{PaymentScheduleEntry, ScheduleStatus};
use crate::modules::settlements::models::{WebhookEventRecord, WebhookEventStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    plans: HashMap<Uuid, PaymentPlan>,
    enrollments: HashMap<Uuid, Enrollment>,
    entries: HashMap<Uuid, PaymentScheduleEntry>,
    payments: HashMap<Uuid, Payment>,
    webhook_events: HashMap<(TenantId, String), WebhookEventRecord>,
    counters: HashMap<TenantId, i64>,
}

/// Process-local store with fully serialised transactions
///
/// `begin` takes the single lock and works on a copy of the state; `commit` swaps the copy in.
/// Used for tests and single-node demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

/// Clone a row only if it belongs to `tenant`
fn owned<T: Clone>(
    value: Option<&T>,
    tenant: &TenantId,
    tenant_of: impl Fn(&T) -> &TenantId,
) -> Option<T> {
    value.filter(|v| tenant_of(*v) == tenant).cloned()
}

#[async_trait]
impl ScheduleTx for MemoryTx {
    async fn insert_plan(&mut self, plan: &PaymentPlan) -> Result<()> {
        if self.work.plans.contains_key(&plan.id) {
            return Err(AppError::conflict(format!("Plan {} already exists", plan.id)));
        }
        self.work.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn update_plan(&mut self, plan: &PaymentPlan) -> Result<()> {
        match self.work.plans.get_mut(&plan.id) {
            Some(stored) if stored.tenant_id == plan.tenant_id => {
                *stored = plan.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Plan {}", plan.id))),
        }
    }

    async fn find_plan(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<PaymentPlan>> {
        Ok(owned(self.work.plans.get(&id), tenant, |p| &p.tenant_id))
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<()> {
        if self.work.enrollments.contains_key(&enrollment.id) {
            return Err(AppError::conflict(format!(
                "Enrollment {} already exists",
                enrollment.id
            )));
        }
        self.work
            .enrollments
            .insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> Result<()> {
        match self.work.enrollments.get_mut(&enrollment.id) {
            Some(stored) if stored.tenant_id == enrollment.tenant_id => {
                *stored = enrollment.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Enrollment {}", enrollment.id))),
        }
    }

    async fn find_enrollment(
        &mut self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<Enrollment>> {
        Ok(owned(self.work.enrollments.get(&id), tenant, |e| &e.tenant_id))
    }

    async fn upsert_entries(&mut self, entries: &[PaymentScheduleEntry]) -> Result<u64> {
        let mut inserted = 0;
        for entry in entries {
            let exists = self.work.entries.values().any(|e| {
                e.enrollment_id == entry.enrollment_id && e.payment_number == entry.payment_number
            });
            if !exists {
                self.work.entries.insert(entry.id, entry.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_entry(
        &mut self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>> {
        Ok(owned(self.work.entries.get(&id), tenant, |e| &e.tenant_id))
    }

    async fn find_entries(
        &mut self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let mut entries: Vec<_> = self
            .work
            .entries
            .values()
            .filter(|e| &e.tenant_id == tenant && e.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.payment_number);
        Ok(entries)
    }

    async fn find_due_entries(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let mut entries: Vec<_> = self
            .work
            .entries
            .values()
            .filter(|e| {
                &e.tenant_id == tenant
                    && matches!(e.status, ScheduleStatus::Pending | ScheduleStatus::Overdue)
                    && e.scheduled_date <= as_of
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.scheduled_date, e.payment_number));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn find_overdue_candidates(
        &mut self,
        tenant: &TenantId,
        as_of: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PaymentScheduleEntry>> {
        let mut entries: Vec<_> = self
            .work
            .entries
            .values()
            .filter(|e| {
                &e.tenant_id == tenant
                    && match e.status {
                        ScheduleStatus::Pending | ScheduleStatus::Failed => {
                            e.scheduled_date < as_of
                        }
                        ScheduleStatus::Overdue => e.scheduled_date >= as_of,
                        _ => false,
                    }
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.scheduled_date, e.payment_number));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn update_entry(&mut self, entry: &mut PaymentScheduleEntry) -> Result<()> {
        let stored = self
            .work
            .entries
            .get_mut(&entry.id)
            .filter(|e| e.tenant_id == entry.tenant_id)
            .ok_or_else(|| AppError::not_found(format!("Schedule entry {}", entry.id)))?;

        if stored.version != entry.version {
            return Err(AppError::conflict(format!(
                "Schedule entry {} was modified concurrently",
                entry.id
            )));
        }
        entry.version += 1;
        *stored = entry.clone();
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if let Some(charge) = &payment.external_charge_id {
            let duplicate = self.work.payments.values().any(|p| {
                p.tenant_id == payment.tenant_id && p.external_charge_id.as_ref() == Some(charge)
            });
            if duplicate {
                return Err(AppError::conflict(format!(
                    "Charge {} is already recorded",
                    charge
                )));
            }
        }
        self.work.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        match self.work.payments.get_mut(&payment.id) {
            Some(stored) if stored.tenant_id == payment.tenant_id => {
                *stored = payment.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Payment {}", payment.id))),
        }
    }

    async fn find_payment(&mut self, tenant: &TenantId, id: Uuid) -> Result<Option<Payment>> {
        Ok(owned(self.work.payments.get(&id), tenant, |p| &p.tenant_id))
    }

    async fn find_payment_by_charge(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .work
            .payments
            .values()
            .find(|p| &p.tenant_id == tenant && p.external_charge_id.as_deref() == Some(charge_ref))
            .cloned())
    }

    async fn find_payments(
        &mut self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<Vec<Payment>> {
        let mut payments: Vec<_> = self
            .work
            .payments
            .values()
            .filter(|p| &p.tenant_id == tenant && p.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn claim_webhook_event(
        &mut self,
        record: &WebhookEventRecord,
    ) -> Result<WebhookEventRecord> {
        let key = (record.tenant_id.clone(), record.event_id().to_string());
        Ok(self
            .work
            .webhook_events
            .entry(key)
            .or_insert_with(|| record.clone())
            .clone())
    }

    async fn save_webhook_event(&mut self, record: &WebhookEventRecord) -> Result<()> {
        let key = (record.tenant_id.clone(), record.event_id().to_string());
        self.work.webhook_events.insert(key, record.clone());
        Ok(())
    }

    async fn find_deferred_events(
        &mut self,
        tenant: &TenantId,
        charge_ref: &str,
    ) -> Result<Vec<WebhookEventRecord>> {
        let mut records: Vec<_> = self
            .work
            .webhook_events
            .values()
            .filter(|r| {
                &r.tenant_id == tenant
                    && r.status == WebhookEventStatus::Deferred
                    && r.event.charge_ref == charge_ref
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.event.id.cmp(&b.event.id))
        });
        Ok(records)
    }

    async fn next_invoice_counter(&mut self, tenant: &TenantId) -> Result<i64> {
        let counter = self.work.counters.entry(tenant.clone()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
