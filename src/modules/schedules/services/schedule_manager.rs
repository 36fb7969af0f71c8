use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::lookups::{enrollment_or_not_found, entry_or_not_found, payment_or_not_found};
use crate::core::{AppError, EngineContext, Result, TenantId};
use crate::modules::enrollments::models::{Enrollment, EnrollmentStatus};
use crate::modules::enrollments::services::refresh_totals;
use crate::modules::events::DomainEvent;
use crate::modules::gateways::RefundRequest;
use crate::modules::invoices::services::InvoiceNumberAllocator;
use crate::modules::payments::models::{Payment, PaymentMethod, RefundSource};
use crate::modules::plans::models::PlanTerms;
use crate::modules::plans::services::{InstallmentSpec, PlanCalculator};
use crate::modules::schedules::models::commands::require_text;
use crate::modules::schedules::models::{
    AdjustDate, AdminRefund, CancelEnrollment, CancellationOutcome, CreateSchedule,
    ManualPayment, OverdueRefreshSummary, PauseEnrollment, PaymentScheduleEntry, PendingRefund,
    ResumeEnrollment, ScheduleStatus, ScheduleView,
};
use crate::modules::schedules::repositories::ScheduleTx;

/// Entry-level and enrollment-level schedule operations
///
/// Each operation runs in a single store transaction. Domain events are published only after
/// that transaction commits; gateway refund calls happen outside any transaction.
pub struct ScheduleManager {
    ctx: EngineContext,
    allocator: InvoiceNumberAllocator,
}

impl ScheduleManager {
    pub fn new(ctx: EngineContext) -> Self {
        let allocator = InvoiceNumberAllocator::new(ctx.clone());
        Self { ctx, allocator }
    }

    /// Create the enrollment, its invoice number and its schedule atomically
    ///
    /// Idempotent on `enrollment_id`: a retry for an existing enrollment inserts only the
    /// entries that are missing and returns the stored schedule.
    pub async fn create_enrollment_schedule(
        &self,
        tenant: &TenantId,
        cmd: CreateSchedule,
    ) -> Result<ScheduleView> {
        require_text(&cmd.user_id, "user_id")?;
        require_text(&cmd.product_id, "product_id")?;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;

        if let Some(mut existing) = tx.find_enrollment(tenant, cmd.enrollment_id).await? {
            if existing.user_id != cmd.user_id
                || existing.product_id != cmd.product_id
                || existing.price != cmd.price
                || existing.currency != cmd.currency
            {
                return Err(AppError::conflict(format!(
                    "Enrollment {} already exists with different terms",
                    existing.id
                )));
            }

            if !existing.is_cancelled() {
                let specs = self.specs_for(tenant, &existing)?;
                let entries = build_entries(&existing, &specs, now);
                let inserted = tx.upsert_entries(&entries).await?;
                if inserted > 0 {
                    refresh_totals(tx.as_mut(), &mut existing, now).await?;
                    warn!(
                        tenant_id = %tenant,
                        enrollment_id = %existing.id,
                        inserted,
                        "Restored missing schedule entries"
                    );
                }
            }

            let view = self.load_view(tx.as_mut(), existing).await?;
            tx.commit().await?;

            info!(
                tenant_id = %tenant,
                enrollment_id = %cmd.enrollment_id,
                "Enrollment schedule already exists"
            );
            return Ok(view);
        }

        let (snapshot, payment_plan_id, plan_version) =
            resolve_plan(tx.as_mut(), tenant, &cmd).await?;
        let scale = self.ctx.tenants.currency_scale(tenant, &cmd.currency);
        let start_date = cmd.start_date.unwrap_or_else(|| self.ctx.clock.today());
        let specs = PlanCalculator::calculate(
            cmd.price,
            &cmd.currency,
            scale,
            &snapshot,
            start_date,
            self.ctx.settings.subscription_periods_ahead,
        )?;

        let invoice_number = self.allocator.allocate_in(tx.as_mut(), tenant).await?;

        let mut enrollment = Enrollment {
            id: cmd.enrollment_id,
            tenant_id: tenant.clone(),
            user_id: cmd.user_id,
            product_id: cmd.product_id,
            payment_plan_id,
            plan_version,
            plan_snapshot: snapshot,
            price: cmd.price,
            currency: cmd.currency,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            payment_status: EnrollmentStatus::Pending,
            invoice_number: invoice_number.value,
            start_date,
            created_at: now,
            updated_at: now,
        };
        tx.insert_enrollment(&enrollment).await?;

        let entries = build_entries(&enrollment, &specs, now);
        tx.upsert_entries(&entries).await?;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;

        let view = self.load_view(tx.as_mut(), enrollment).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            enrollment_id = %view.enrollment.id,
            invoice_number = %view.enrollment.invoice_number,
            plan_type = view.enrollment.plan_snapshot.plan_type(),
            entries = view.entries.len(),
            "Enrollment schedule created"
        );
        self.ctx.events.publish(DomainEvent::ScheduleCreated {
            tenant_id: tenant.clone(),
            enrollment_id: view.enrollment.id,
            invoice_number: view.enrollment.invoice_number.clone(),
            entries: view.entries.len(),
            total_amount: view.enrollment.total_amount,
        });

        Ok(view)
    }

    pub async fn get_schedule(
        &self,
        tenant: &TenantId,
        enrollment_id: Uuid,
    ) -> Result<ScheduleView> {
        let mut tx = self.ctx.store.begin().await?;
        let enrollment = enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?;
        self.load_view(tx.as_mut(), enrollment).await
    }

    /// Move one unpaid entry to a new due date, appending to its adjustment history
    pub async fn adjust_date(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        cmd: AdjustDate,
    ) -> Result<PaymentScheduleEntry> {
        require_text(&cmd.actor, "actor")?;
        require_text(&cmd.reason, "reason")?;
        let now = self.ctx.clock.now();
        if cmd.new_date < self.ctx.clock.today() {
            return Err(AppError::validation(format!(
                "New date {} is in the past",
                cmd.new_date
            )));
        }

        let mut tx = self.ctx.store.begin().await?;
        let mut entry = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;
        entry.ensure_version(cmd.expected_version)?;
        entry.ensure_status(
            &[
                ScheduleStatus::Pending,
                ScheduleStatus::Overdue,
                ScheduleStatus::Failed,
            ],
            "reschedule",
        )?;

        let old_date = entry.scheduled_date;
        entry.reschedule(cmd.new_date, cmd.reason.clone(), cmd.actor.clone(), now);
        tx.update_entry(&mut entry).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            entry_id = %entry.id,
            old_date = %old_date,
            new_date = %cmd.new_date,
            actor = %cmd.actor,
            "Schedule entry rescheduled"
        );
        self.ctx.events.publish(DomainEvent::ScheduleAdjusted {
            tenant_id: tenant.clone(),
            enrollment_id: entry.enrollment_id,
            entry_id: entry.id,
            old_date,
            new_date: cmd.new_date,
            actor: cmd.actor,
            reason: cmd.reason,
        });

        Ok(entry)
    }

    /// Pause every unpaid entry that is not yet due
    pub async fn pause(
        &self,
        tenant: &TenantId,
        enrollment_id: Uuid,
        cmd: PauseEnrollment,
    ) -> Result<ScheduleView> {
        require_text(&cmd.actor, "actor")?;
        require_text(&cmd.reason, "reason")?;
        let now = self.ctx.clock.now();
        let today = self.ctx.clock.today();

        let mut tx = self.ctx.store.begin().await?;
        let mut enrollment = enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?;
        match enrollment.payment_status {
            EnrollmentStatus::Pending | EnrollmentStatus::Active => {}
            status => {
                return Err(AppError::conflict(format!(
                    "Cannot pause enrollment {} in status {}",
                    enrollment.id, status
                )))
            }
        }

        let mut paused = 0;
        for mut entry in tx.find_entries(tenant, enrollment.id).await? {
            let pausable = matches!(
                entry.status,
                ScheduleStatus::Pending | ScheduleStatus::Overdue
            ) && entry.scheduled_date >= today;
            if !pausable {
                continue;
            }
            entry.transition(ScheduleStatus::Paused, now)?;
            tx.update_entry(&mut entry).await?;
            paused += 1;
        }

        enrollment.payment_status = EnrollmentStatus::Paused;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        let view = self.load_view(tx.as_mut(), enrollment).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            enrollment_id = %enrollment_id,
            entries = paused,
            actor = %cmd.actor,
            reason = %cmd.reason,
            "Enrollment payments paused"
        );
        self.ctx.events.publish(DomainEvent::PaymentsPaused {
            tenant_id: tenant.clone(),
            enrollment_id,
            entries: paused,
            actor: cmd.actor,
            reason: cmd.reason,
        });

        Ok(view)
    }

    /// Return paused entries to pending, optionally shifting them to a new start date
    ///
    /// The shift is the distance from the earliest paused date to `new_start_date`, applied to
    /// every paused entry so their spacing is preserved.
    pub async fn resume(
        &self,
        tenant: &TenantId,
        enrollment_id: Uuid,
        cmd: ResumeEnrollment,
    ) -> Result<ScheduleView> {
        require_text(&cmd.actor, "actor")?;
        let now = self.ctx.clock.now();
        if let Some(start) = cmd.new_start_date {
            if start < self.ctx.clock.today() {
                return Err(AppError::validation(format!(
                    "New start date {} is in the past",
                    start
                )));
            }
        }

        let mut tx = self.ctx.store.begin().await?;
        let mut enrollment = enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?;
        if enrollment.payment_status != EnrollmentStatus::Paused {
            return Err(AppError::conflict(format!(
                "Enrollment {} is not paused",
                enrollment.id
            )));
        }

        let paused: Vec<_> = tx
            .find_entries(tenant, enrollment.id)
            .await?
            .into_iter()
            .filter(|e| e.status == ScheduleStatus::Paused)
            .collect();

        let shift = match (
            cmd.new_start_date,
            paused.iter().map(|e| e.scheduled_date).min(),
        ) {
            (Some(start), Some(earliest)) => start.signed_duration_since(earliest),
            _ => Duration::zero(),
        };

        let resumed = paused.len();
        for mut entry in paused {
            if shift != Duration::zero() {
                let new_date = shift_date(entry.scheduled_date, shift)?;
                entry.reschedule(new_date, "resumed after pause", cmd.actor.clone(), now);
            }
            entry.transition(ScheduleStatus::Pending, now)?;
            tx.update_entry(&mut entry).await?;
        }

        enrollment.payment_status = EnrollmentStatus::Active;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        let view = self.load_view(tx.as_mut(), enrollment).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            enrollment_id = %enrollment_id,
            entries = resumed,
            shift_days = shift.num_days(),
            actor = %cmd.actor,
            "Enrollment payments resumed"
        );
        self.ctx.events.publish(DomainEvent::PaymentsResumed {
            tenant_id: tenant.clone(),
            enrollment_id,
            entries: resumed,
            actor: cmd.actor,
            new_start_date: cmd.new_start_date,
        });

        Ok(view)
    }

    /// Cancel every unpaid entry and refund up to `refund_amount`, newest payment first
    ///
    /// The cancellation commits before any refund is attempted. Refunds the gateway rejects
    /// are reported in `pending_refunds` instead of undoing the cancellation.
    pub async fn cancel_enrollment(
        &self,
        tenant: &TenantId,
        enrollment_id: Uuid,
        cmd: CancelEnrollment,
    ) -> Result<CancellationOutcome> {
        require_text(&cmd.actor, "actor")?;
        if cmd.refund_amount < Decimal::ZERO {
            return Err(AppError::validation("Refund amount cannot be negative"));
        }
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        let mut enrollment = enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?;
        if enrollment.is_cancelled() {
            return Err(AppError::conflict(format!(
                "Enrollment {} is already cancelled",
                enrollment.id
            )));
        }

        let payments = tx.find_payments(tenant, enrollment.id).await?;
        let refundable: Decimal = payments.iter().map(Payment::refundable_amount).sum();
        if cmd.refund_amount > refundable {
            return Err(AppError::validation(format!(
                "Refund {} exceeds the {} paid on enrollment {}",
                cmd.refund_amount, refundable, enrollment.id
            )));
        }
        let planned = plan_refunds(&payments, cmd.refund_amount);

        let mut cancelled_entries = 0;
        for mut entry in tx.find_entries(tenant, enrollment.id).await? {
            if entry.status.is_terminal() {
                continue;
            }
            entry.transition(ScheduleStatus::Cancelled, now)?;
            tx.update_entry(&mut entry).await?;
            cancelled_entries += 1;
        }

        enrollment.payment_status = EnrollmentStatus::Cancelled;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            enrollment_id = %enrollment_id,
            cancelled_entries,
            refund_amount = %cmd.refund_amount,
            actor = %cmd.actor,
            "Enrollment cancelled"
        );
        self.ctx.events.publish(DomainEvent::EnrollmentCancelled {
            tenant_id: tenant.clone(),
            enrollment_id,
            cancelled_entries,
            refund_amount: cmd.refund_amount,
            actor: cmd.actor.clone(),
        });

        let mut refunded_amount = Decimal::ZERO;
        let mut pending_refunds = Vec::new();
        for (payment_id, amount) in planned {
            let refund = AdminRefund {
                amount,
                reason: cmd.reason.clone(),
                actor: cmd.actor.clone(),
            };
            match self.refund_payment(tenant, payment_id, refund).await {
                Ok(_) => refunded_amount += amount,
                Err(e) => {
                    warn!(
                        tenant_id = %tenant,
                        enrollment_id = %enrollment_id,
                        payment_id = %payment_id,
                        amount = %amount,
                        error = %e,
                        "Cancellation refund failed"
                    );
                    pending_refunds.push(PendingRefund {
                        payment_id,
                        amount,
                        error: e.to_string(),
                    });
                }
            }
        }

        let enrollment = {
            let mut tx = self.ctx.store.begin().await?;
            enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?
        };

        Ok(CancellationOutcome {
            enrollment,
            cancelled_entries,
            refunded_amount,
            pending_refunds,
        })
    }

    /// Mark an unpaid entry paid from an off-platform payment
    pub async fn record_manual_payment(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        cmd: ManualPayment,
    ) -> Result<Payment> {
        require_text(&cmd.actor, "actor")?;
        require_text(&cmd.payment_method, "payment_method")?;
        let method = PaymentMethod::parse(cmd.payment_method.trim());
        if method == PaymentMethod::Gateway {
            return Err(AppError::validation(
                "Gateway payments are recorded from settlement events",
            ));
        }
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        let mut entry = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;
        entry.ensure_version(cmd.expected_version)?;
        entry.ensure_status(
            &[
                ScheduleStatus::Pending,
                ScheduleStatus::Overdue,
                ScheduleStatus::Failed,
            ],
            "record a payment for",
        )?;
        let mut enrollment =
            enrollment_or_not_found(tx.as_mut(), tenant, entry.enrollment_id).await?;

        let payment = Payment::manual(
            tenant.clone(),
            enrollment.id,
            entry.id,
            entry.amount,
            entry.currency.clone(),
            method,
            cmd.transaction_reference.clone(),
            now,
        );
        tx.insert_payment(&payment).await?;
        entry.transition(ScheduleStatus::Paid, now)?;
        tx.update_entry(&mut entry).await?;
        let change = refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            entry_id = %entry.id,
            payment_id = %payment.id,
            amount = %payment.amount,
            payment_method = payment.payment_method.as_str(),
            actor = %cmd.actor,
            "Manual payment recorded"
        );
        self.ctx.events.publish(DomainEvent::PaymentRecorded {
            tenant_id: tenant.clone(),
            enrollment_id: enrollment.id,
            entry_id: entry.id,
            payment_id: payment.id,
            amount: payment.amount,
            payment_method: payment.payment_method.as_str().to_string(),
            actor: cmd.actor,
        });
        if change.completed() {
            self.ctx.events.publish(DomainEvent::EnrollmentCompleted {
                tenant_id: tenant.clone(),
                enrollment_id: enrollment.id,
                paid_amount: enrollment.paid_amount,
            });
        }

        Ok(payment)
    }

    /// Refund part or all of a settled payment
    ///
    /// Gateway payments are refunded at the gateway first; the refund is recorded only once
    /// the gateway has accepted it. Off-platform payments are recorded directly.
    pub async fn refund_payment(
        &self,
        tenant: &TenantId,
        payment_id: Uuid,
        cmd: AdminRefund,
    ) -> Result<Payment> {
        require_text(&cmd.actor, "actor")?;
        if cmd.amount <= Decimal::ZERO {
            return Err(AppError::validation("Refund amount must be positive"));
        }

        let payment = {
            let mut tx = self.ctx.store.begin().await?;
            payment_or_not_found(tx.as_mut(), tenant, payment_id).await?
        };
        if !payment.status.is_settled() {
            return Err(AppError::conflict(format!(
                "Payment {} in status {} cannot be refunded",
                payment.id, payment.status
            )));
        }
        if cmd.amount > payment.refundable_amount() {
            return Err(AppError::validation(format!(
                "Refund {} exceeds refundable amount {} on payment {}",
                cmd.amount,
                payment.refundable_amount(),
                payment.id
            )));
        }

        let external_refund_id = match &payment.external_charge_id {
            Some(charge_ref) => {
                let response = self
                    .ctx
                    .gateway
                    .create_refund(RefundRequest {
                        charge_ref: charge_ref.clone(),
                        amount: cmd.amount,
                        reason: cmd.reason.clone(),
                        idempotency_key: format!(
                            "refund-{}-{}",
                            payment.id,
                            payment.refund_history.len() + 1
                        ),
                    })
                    .await?;
                Some(response.refund_ref)
            }
            None => None,
        };

        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut payment = payment_or_not_found(tx.as_mut(), tenant, payment_id).await?;
        if let Some(refund_ref) = &external_refund_id {
            if payment.has_refund(refund_ref) {
                info!(
                    tenant_id = %tenant,
                    payment_id = %payment.id,
                    refund_ref = %refund_ref,
                    "Refund already recorded from settlement event"
                );
                return Ok(payment);
            }
        }

        let applied = payment.apply_refund(
            cmd.amount,
            cmd.reason.clone(),
            external_refund_id.clone(),
            RefundSource::Admin,
            cmd.actor.clone(),
            now,
        )?;
        tx.update_payment(&payment).await?;
        let mut enrollment =
            enrollment_or_not_found(tx.as_mut(), tenant, payment.enrollment_id).await?;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            payment_id = %payment.id,
            amount = %applied,
            refunded_total = %payment.refunded_amount,
            actor = %cmd.actor,
            "Payment refunded"
        );
        self.ctx.events.publish(DomainEvent::PaymentRefunded {
            tenant_id: tenant.clone(),
            enrollment_id: payment.enrollment_id,
            payment_id: payment.id,
            amount: applied,
            refunded_total: payment.refunded_amount,
            external_refund_id,
        });

        Ok(payment)
    }

    /// Materialise further subscription periods after the last existing entry
    ///
    /// Any drift of the last entry from its nominal date (from a resume shift) carries over to
    /// the new periods. A subscription at its `billing_periods` cap is returned unchanged.
    pub async fn extend_subscription(
        &self,
        tenant: &TenantId,
        enrollment_id: Uuid,
        periods: Option<i32>,
    ) -> Result<ScheduleView> {
        let count = periods.unwrap_or(self.ctx.settings.subscription_periods_ahead);
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        let mut enrollment = enrollment_or_not_found(tx.as_mut(), tenant, enrollment_id).await?;
        if !enrollment.plan_snapshot.is_subscription() {
            return Err(AppError::validation(format!(
                "Enrollment {} is not a subscription",
                enrollment.id
            )));
        }
        if matches!(
            enrollment.payment_status,
            EnrollmentStatus::Cancelled | EnrollmentStatus::Paused
        ) {
            return Err(AppError::conflict(format!(
                "Cannot extend enrollment {} in status {}",
                enrollment.id, enrollment.payment_status
            )));
        }

        let entries = tx.find_entries(tenant, enrollment.id).await?;
        let last = entries
            .iter()
            .max_by_key(|e| e.payment_number)
            .ok_or_else(|| {
                AppError::internal(format!("Enrollment {} has no schedule", enrollment.id))
            })?;

        // The first spec is the nominal date of the current last period.
        let specs = PlanCalculator::subscription_periods(
            enrollment.price,
            &enrollment.plan_snapshot,
            enrollment.start_date,
            last.payment_number - 1,
            count + 1,
        )?;
        let drift = specs
            .first()
            .map(|nominal| last.scheduled_date.signed_duration_since(nominal.due_date))
            .unwrap_or_else(Duration::zero);
        let specs: Vec<InstallmentSpec> = specs
            .into_iter()
            .skip(1)
            .map(|mut spec| {
                spec.due_date = shift_date(spec.due_date, drift)?;
                Ok(spec)
            })
            .collect::<Result<_>>()?;

        if specs.is_empty() {
            info!(
                tenant_id = %tenant,
                enrollment_id = %enrollment.id,
                "Subscription already at its billing period cap"
            );
            return self.load_view(tx.as_mut(), enrollment).await;
        }

        let new_entries = build_entries(&enrollment, &specs, now);
        let added = tx.upsert_entries(&new_entries).await? as usize;
        refresh_totals(tx.as_mut(), &mut enrollment, now).await?;
        let view = self.load_view(tx.as_mut(), enrollment).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            enrollment_id = %enrollment_id,
            added_entries = added,
            "Subscription extended"
        );
        self.ctx.events.publish(DomainEvent::SubscriptionExtended {
            tenant_id: tenant.clone(),
            enrollment_id,
            added_entries: added,
            total_amount: view.enrollment.total_amount,
        });

        Ok(view)
    }

    /// Persist the derived overdue flag for entries whose stored status disagrees with `as_of`
    ///
    /// Each entry is updated in its own transaction; an entry changed concurrently is skipped
    /// and picked up by the next run.
    pub async fn refresh_overdue(
        &self,
        tenant: &TenantId,
        as_of: Option<NaiveDate>,
    ) -> Result<OverdueRefreshSummary> {
        let as_of = as_of.unwrap_or_else(|| self.ctx.clock.today());
        let candidates = {
            let mut tx = self.ctx.store.begin().await?;
            tx.find_overdue_candidates(tenant, as_of, self.ctx.settings.due_scan_batch_size)
                .await?
        };

        let mut summary = OverdueRefreshSummary::default();
        for candidate in candidates {
            match self.refresh_entry(tenant, candidate.id, as_of).await {
                Ok(Some(ScheduleStatus::Overdue)) => summary.marked_overdue += 1,
                Ok(Some(_)) => summary.restored_pending += 1,
                Ok(None) => summary.skipped += 1,
                Err(AppError::Conflict(reason)) => {
                    warn!(
                        tenant_id = %tenant,
                        entry_id = %candidate.id,
                        reason = %reason,
                        "Skipped overdue refresh for entry"
                    );
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            tenant_id = %tenant,
            as_of = %as_of,
            marked_overdue = summary.marked_overdue,
            restored_pending = summary.restored_pending,
            skipped = summary.skipped,
            "Overdue refresh finished"
        );
        Ok(summary)
    }

    async fn refresh_entry(
        &self,
        tenant: &TenantId,
        entry_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Option<ScheduleStatus>> {
        let mut tx = self.ctx.store.begin().await?;
        let mut entry = entry_or_not_found(tx.as_mut(), tenant, entry_id).await?;

        let past_due = entry.scheduled_date < as_of;
        let next = match entry.status {
            ScheduleStatus::Pending | ScheduleStatus::Failed if past_due => ScheduleStatus::Overdue,
            ScheduleStatus::Overdue if !past_due => ScheduleStatus::Pending,
            _ => return Ok(None),
        };

        entry.transition(next, self.ctx.clock.now())?;
        tx.update_entry(&mut entry).await?;
        tx.commit().await?;
        Ok(Some(next))
    }

    fn specs_for(
        &self,
        tenant: &TenantId,
        enrollment: &Enrollment,
    ) -> Result<Vec<InstallmentSpec>> {
        PlanCalculator::calculate(
            enrollment.price,
            &enrollment.currency,
            self.ctx.tenants.currency_scale(tenant, &enrollment.currency),
            &enrollment.plan_snapshot,
            enrollment.start_date,
            self.ctx.settings.subscription_periods_ahead,
        )
    }

    async fn load_view(
        &self,
        tx: &mut dyn ScheduleTx,
        enrollment: Enrollment,
    ) -> Result<ScheduleView> {
        let entries = tx.find_entries(&enrollment.tenant_id, enrollment.id).await?;
        let payments = tx.find_payments(&enrollment.tenant_id, enrollment.id).await?;
        Ok(ScheduleView::new(
            enrollment,
            entries,
            payments,
            self.ctx.clock.today(),
        ))
    }
}

/// Embedded terms win over the referenced plan; the reference is still validated and kept
async fn resolve_plan(
    tx: &mut dyn ScheduleTx,
    tenant: &TenantId,
    cmd: &CreateSchedule,
) -> Result<(PlanTerms, Option<Uuid>, Option<i32>)> {
    let referenced = match cmd.payment_plan_id {
        Some(id) => Some(
            tx.find_plan(tenant, id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Plan {}", id)))?,
        ),
        None => None,
    };

    match (&cmd.plan, referenced) {
        (Some(terms), plan) => Ok((
            terms.clone(),
            plan.as_ref().map(|p| p.id),
            plan.map(|p| p.version),
        )),
        (None, Some(plan)) => Ok((plan.terms, Some(plan.id), Some(plan.version))),
        (None, None) => Err(AppError::validation(
            "Either plan or payment_plan_id is required",
        )),
    }
}

fn build_entries(
    enrollment: &Enrollment,
    specs: &[InstallmentSpec],
    now: DateTime<Utc>,
) -> Vec<PaymentScheduleEntry> {
    specs
        .iter()
        .map(|spec| {
            PaymentScheduleEntry::from_spec(
                enrollment.tenant_id.clone(),
                enrollment.id,
                enrollment.currency.clone(),
                spec,
                now,
            )
        })
        .collect()
}

fn shift_date(date: NaiveDate, by: Duration) -> Result<NaiveDate> {
    date.checked_add_signed(by)
        .ok_or_else(|| AppError::validation(format!("Date {} shifted out of range", date)))
}

/// Split `amount` across refundable payments, most recently paid first
fn plan_refunds(payments: &[Payment], amount: Decimal) -> Vec<(Uuid, Decimal)> {
    let mut candidates: Vec<&Payment> = payments
        .iter()
        .filter(|p| p.refundable_amount() > Decimal::ZERO)
        .collect();
    candidates.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));

    let mut remaining = amount;
    let mut planned = Vec::new();
    for payment in candidates {
        if remaining <= Decimal::ZERO {
            break;
        }
        let share = remaining.min(payment.refundable_amount());
        planned.push((payment.id, share));
        remaining -= share;
    }
    planned
}
