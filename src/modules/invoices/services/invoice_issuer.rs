use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::{AppError, EngineContext, Result, TenantId};
use crate::modules::enrollments::models::{Enrollment, EnrollmentStatus};
use crate::modules::events::DomainEvent;
use crate::modules::gateways::ChargeRequest;
use crate::modules::payments::models::{Payment, PaymentStatus};
use crate::modules::schedules::models::{PaymentScheduleEntry, ScheduleStatus};
use crate::modules::schedules::repositories::ScheduleTx;
use crate::modules::schedules::services::lookups::{
    enrollment_or_not_found, entry_or_not_found, payment_or_not_found,
};
use crate::modules::settlements::services::SettlementReconciler;

/// Why an entry is being charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueMode {
    /// Due-date driven: only pending or overdue entries that are due and have charge attempts left
    Scheduled,
    /// Operator initiated: any unpaid, unpaused entry, including one whose retries are exhausted
    ChargeNow,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedInvoice {
    pub entry: PaymentScheduleEntry,
    pub payment: Payment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DueScanSummary {
    pub scanned: usize,
    pub issued: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Turns due schedule entries into gateway charges
///
/// The gateway call is made with no transaction open. The entry is validated before the call
/// and again before the charge is recorded, so a concurrent settlement or admin change wins.
pub struct InvoiceIssuer {
    ctx: EngineContext,
    reconciler: SettlementReconciler,
}

impl InvoiceIssuer {
    pub fn new(ctx: EngineContext) -> Self {
        let reconciler = SettlementReconciler::new(ctx.clone());
        Self { ctx, reconciler }
    }

    /// Create a gateway charge for one entry and record it as a pending payment
    pub async fn issue(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        mode: IssueMode,
    ) -> Result<IssuedInvoice> {
        self.issue_as_of(tenant, entry_id, mode, self.ctx.clock.today())
            .await
    }

    /// Issue every entry due on or before `as_of` (default today)
    ///
    /// Entries that are no longer eligible when they are reached are skipped; gateway failures
    /// are counted and left for the next scan.
    pub async fn issue_due(
        &self,
        tenant: &TenantId,
        as_of: Option<NaiveDate>,
    ) -> Result<DueScanSummary> {
        let as_of = as_of.unwrap_or_else(|| self.ctx.clock.today());
        let due = {
            let mut tx = self.ctx.store.begin().await?;
            tx.find_due_entries(tenant, as_of, self.ctx.settings.due_scan_batch_size)
                .await?
        };

        let mut summary = DueScanSummary {
            scanned: due.len(),
            ..DueScanSummary::default()
        };
        for entry in due {
            if entry.failed_attempts >= self.ctx.settings.max_charge_attempts {
                summary.skipped += 1;
                continue;
            }

            match self
                .issue_as_of(tenant, entry.id, IssueMode::Scheduled, as_of)
                .await
            {
                Ok(_) => summary.issued += 1,
                Err(AppError::Conflict(reason)) | Err(AppError::NotFound(reason)) => {
                    debug!(entry_id = %entry.id, reason = %reason, "Skipped due entry");
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!(
                        tenant_id = %tenant,
                        entry_id = %entry.id,
                        error = %e,
                        "Failed to issue due entry"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            tenant_id = %tenant,
            as_of = %as_of,
            scanned = summary.scanned,
            issued = summary.issued,
            skipped = summary.skipped,
            failed = summary.failed,
            "Due scan finished"
        );
        Ok(summary)
    }

    async fn issue_as_of(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        mode: IssueMode,
        as_of: NaiveDate,
    ) -> Result<IssuedInvoice> {
        let (entry, enrollment) = {
            let mut tx = self.ctx.store.begin().await?;
            let entry = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;
            let enrollment = self.check_issuable(tx.as_mut(), &entry, mode, as_of).await?;
            (entry, enrollment)
        };

        let idempotency_key = format!("charge-{}-v{}", entry.id, entry.version);
        let request = ChargeRequest {
            amount: entry.amount,
            currency: entry.currency.clone(),
            customer_ref: enrollment.user_id.clone(),
            description: format!(
                "{} payment {} ({})",
                enrollment.invoice_number, entry.payment_number, entry.payment_type
            ),
            idempotency_key: idempotency_key.clone(),
        };

        let charge = match self.ctx.gateway.create_charge(request).await {
            Ok(charge) => charge,
            Err(e) => {
                warn!(
                    tenant_id = %tenant,
                    entry_id = %entry.id,
                    gateway = self.ctx.gateway.name(),
                    error = %e,
                    "Charge creation failed"
                );
                self.ctx.events.publish(DomainEvent::InvoiceIssueFailed {
                    tenant_id: tenant.clone(),
                    enrollment_id: entry.enrollment_id,
                    entry_id: entry.id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut current = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;
        if let Err(e) = self.check_issuable(tx.as_mut(), &current, mode, as_of).await {
            self.record_orphaned_charge(tx, &current, &charge.charge_ref, &idempotency_key, &e)
                .await?;
            return Err(e);
        }

        if current.status == ScheduleStatus::Failed {
            current.transition(ScheduleStatus::Pending, now)?;
        }
        current.external_invoice_ref = Some(charge.charge_ref.clone());
        current.updated_at = now;
        tx.update_entry(&mut current).await?;

        let payment = Payment::for_charge(
            tenant.clone(),
            current.enrollment_id,
            current.id,
            current.amount,
            current.currency.clone(),
            charge.charge_ref.clone(),
            now,
        );
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            entry_id = %current.id,
            charge_ref = %charge.charge_ref,
            amount = %current.amount,
            mode = ?mode,
            "Invoice issued"
        );
        self.ctx.events.publish(DomainEvent::InvoiceIssued {
            tenant_id: tenant.clone(),
            enrollment_id: current.enrollment_id,
            entry_id: current.id,
            charge_ref: charge.charge_ref.clone(),
            amount: current.amount,
        });

        // Settlement events that beat the charge record to the store are waiting in the ledger.
        match self
            .reconciler
            .replay_deferred(tenant, &charge.charge_ref)
            .await
        {
            Ok(0) => Ok(IssuedInvoice {
                entry: current,
                payment,
            }),
            Ok(replayed) => {
                info!(
                    tenant_id = %tenant,
                    charge_ref = %charge.charge_ref,
                    replayed,
                    "Applied settlement events received before issuance"
                );
                self.reload(tenant, entry_id, payment.id).await
            }
            Err(e) => {
                warn!(
                    tenant_id = %tenant,
                    charge_ref = %charge.charge_ref,
                    error = %e,
                    "Replay of deferred settlement events failed"
                );
                Ok(IssuedInvoice {
                    entry: current,
                    payment,
                })
            }
        }
    }

    /// Keep a charge the gateway created for an entry that changed meanwhile
    ///
    /// The payment is recorded as pending without touching the entry, so the charge's settlement
    /// webhook finds it and either applies or flags it. The charge itself is flagged for review.
    async fn record_orphaned_charge(
        &self,
        mut tx: Box<dyn ScheduleTx>,
        entry: &PaymentScheduleEntry,
        charge_ref: &str,
        idempotency_key: &str,
        cause: &AppError,
    ) -> Result<()> {
        let now = self.ctx.clock.now();
        if tx
            .find_payment_by_charge(&entry.tenant_id, charge_ref)
            .await?
            .is_none()
        {
            let payment = Payment::for_charge(
                entry.tenant_id.clone(),
                entry.enrollment_id,
                entry.id,
                entry.amount,
                entry.currency.clone(),
                charge_ref.to_string(),
                now,
            );
            tx.insert_payment(&payment).await?;
            tx.commit().await?;
        }

        let detail = format!(
            "charge {} created for schedule entry {} after it changed: {}",
            charge_ref, entry.id, cause
        );
        error!(
            tenant_id = %entry.tenant_id,
            entry_id = %entry.id,
            charge_ref = %charge_ref,
            error = %cause,
            "Entry changed while its charge was created; charge recorded for review"
        );
        self.ctx.events.publish(DomainEvent::ReconciliationFlagged {
            tenant_id: entry.tenant_id.clone(),
            event_id: idempotency_key.to_string(),
            charge_ref: charge_ref.to_string(),
            detail,
            flagged_at: now,
        });
        Ok(())
    }

    async fn reload(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        payment_id: Uuid,
    ) -> Result<IssuedInvoice> {
        let mut tx = self.ctx.store.begin().await?;
        let entry = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;
        let payment = payment_or_not_found(tx.as_mut(), tenant, payment_id).await?;
        Ok(IssuedInvoice { entry, payment })
    }

    /// Reject entries that must not be charged now; returns the owning enrollment
    async fn check_issuable(
        &self,
        tx: &mut dyn ScheduleTx,
        entry: &PaymentScheduleEntry,
        mode: IssueMode,
        as_of: NaiveDate,
    ) -> Result<Enrollment> {
        match mode {
            IssueMode::Scheduled => {
                entry.ensure_status(
                    &[ScheduleStatus::Pending, ScheduleStatus::Overdue],
                    "issue",
                )?;
                if entry.scheduled_date > as_of {
                    return Err(AppError::conflict(format!(
                        "Schedule entry {} is not due until {}",
                        entry.id, entry.scheduled_date
                    )));
                }
                if entry.failed_attempts >= self.ctx.settings.max_charge_attempts {
                    return Err(AppError::conflict(format!(
                        "Schedule entry {} has exhausted its charge attempts",
                        entry.id
                    )));
                }
            }
            IssueMode::ChargeNow => entry.ensure_status(
                &[
                    ScheduleStatus::Pending,
                    ScheduleStatus::Overdue,
                    ScheduleStatus::Failed,
                ],
                "charge",
            )?,
        }

        let enrollment =
            enrollment_or_not_found(tx, &entry.tenant_id, entry.enrollment_id).await?;
        if matches!(
            enrollment.payment_status,
            EnrollmentStatus::Paused | EnrollmentStatus::Cancelled
        ) {
            return Err(AppError::conflict(format!(
                "Enrollment {} is {}",
                enrollment.id, enrollment.payment_status
            )));
        }

        let in_flight = tx
            .find_payments(&entry.tenant_id, entry.enrollment_id)
            .await?
            .into_iter()
            .any(|p| p.schedule_entry_id == entry.id && p.status == PaymentStatus::Pending);
        if in_flight {
            return Err(AppError::conflict(format!(
                "Schedule entry {} already has a charge in flight",
                entry.id
            )));
        }

        Ok(enrollment)
    }
}
