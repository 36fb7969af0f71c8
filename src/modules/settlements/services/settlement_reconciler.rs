use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{AppError, EngineContext, Result, TenantId};
use crate::modules::enrollments::services::refresh_totals;
use crate::modules::events::DomainEvent;
use crate::modules::gateways::{GatewayEvent, GatewayEventType};
use crate::modules::payments::models::{Payment, PaymentStatus, RefundSource};
use crate::modules::schedules::models::ScheduleStatus;
use crate::modules::schedules::repositories::ScheduleTx;
use crate::modules::schedules::services::lookups::{enrollment_or_not_found, entry_or_not_found};
use crate::modules::settlements::models::{WebhookEventRecord, WebhookEventStatus};

/// Result of applying one gateway event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// State changed
    Applied,
    /// Event id already handled, or the payment already reflects it
    Duplicate,
    /// Event arrived before the charge was recorded or settled; replayed later
    Deferred,
    /// Recorded without touching payment state; an operator has to look at it
    NeedsReview,
}

impl ReconcileOutcome {
    fn ledger_status(self) -> WebhookEventStatus {
        match self {
            Self::Applied | Self::Duplicate => WebhookEventStatus::Processed,
            Self::Deferred => WebhookEventStatus::Deferred,
            Self::NeedsReview => WebhookEventStatus::NeedsReview,
        }
    }
}

/// Applies gateway settlement events to payments, schedule entries and enrollment totals
///
/// Every event id is claimed in the webhook ledger inside the same transaction that applies
/// it, so a redelivered or concurrently delivered event is applied at most once. Events that
/// contradict recorded state are rolled back and recorded as `needs_review` instead.
pub struct SettlementReconciler {
    ctx: EngineContext,
}

impl SettlementReconciler {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Verify a raw webhook delivery, parse it and apply it
    pub async fn handle_webhook(
        &self,
        tenant: &TenantId,
        signature: &str,
        payload: &[u8],
    ) -> Result<ReconcileOutcome> {
        if !self.ctx.gateway.verify_webhook(signature, payload) {
            warn!(tenant_id = %tenant, "Rejected webhook with invalid signature");
            return Err(AppError::unauthorized("Invalid webhook signature"));
        }
        let event = self.ctx.gateway.parse_event(payload)?;
        self.apply_gateway_event(tenant, event).await
    }

    /// Apply one parsed gateway event
    ///
    /// The event is recorded in the ledger whatever the business outcome. An event for a charge
    /// with no recorded payment yet is deferred and flagged, then replayed by `replay_deferred`
    /// once the issuer records the charge.
    pub async fn apply_gateway_event(
        &self,
        tenant: &TenantId,
        event: GatewayEvent,
    ) -> Result<ReconcileOutcome> {
        self.process(tenant, event, false).await
    }

    /// Re-run deferred events for a charge in arrival order
    ///
    /// Returns how many of them were applied this time.
    pub async fn replay_deferred(&self, tenant: &TenantId, charge_ref: &str) -> Result<usize> {
        let deferred = {
            let mut tx = self.ctx.store.begin().await?;
            tx.find_deferred_events(tenant, charge_ref).await?
        };

        let mut applied = 0;
        for record in deferred {
            if self.process(tenant, record.event, true).await? == ReconcileOutcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    async fn process(
        &self,
        tenant: &TenantId,
        event: GatewayEvent,
        replay: bool,
    ) -> Result<ReconcileOutcome> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut record = tx
            .claim_webhook_event(&WebhookEventRecord::received(
                tenant.clone(),
                event.clone(),
                now,
            ))
            .await?;

        let already_handled = if replay {
            record.status != WebhookEventStatus::Deferred
        } else {
            record.status.is_final()
        };
        if already_handled {
            info!(
                tenant_id = %tenant,
                event_id = %event.id,
                status = record.status.as_str(),
                "Duplicate gateway event"
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        let mut events = Vec::new();
        match self.apply(tx.as_mut(), tenant, &event, &mut events, now).await {
            Ok((outcome, detail)) => {
                record.finish(outcome.ledger_status(), detail, now);
                tx.save_webhook_event(&record).await?;
                tx.commit().await?;

                info!(
                    tenant_id = %tenant,
                    event_id = %event.id,
                    event_type = event.event_type.as_str(),
                    charge_ref = %event.charge_ref,
                    outcome = ?outcome,
                    replay,
                    "Gateway event reconciled"
                );
                self.ctx.events.publish_all(events);
                Ok(outcome)
            }
            Err(AppError::ReconciliationInconsistency(detail)) => {
                drop(tx);
                self.flag(tenant, event, detail).await
            }
            Err(e) => Err(e),
        }
    }

    /// Record the event as needing review in a fresh transaction
    async fn flag(
        &self,
        tenant: &TenantId,
        event: GatewayEvent,
        detail: String,
    ) -> Result<ReconcileOutcome> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut record = tx
            .claim_webhook_event(&WebhookEventRecord::received(
                tenant.clone(),
                event.clone(),
                now,
            ))
            .await?;
        if matches!(
            record.status,
            WebhookEventStatus::Processed | WebhookEventStatus::NeedsReview
        ) {
            return Ok(ReconcileOutcome::Duplicate);
        }

        record.finish(WebhookEventStatus::NeedsReview, Some(detail.clone()), now);
        tx.save_webhook_event(&record).await?;
        tx.commit().await?;

        warn!(
            tenant_id = %tenant,
            event_id = %event.id,
            charge_ref = %event.charge_ref,
            detail = %detail,
            "Gateway event flagged for review"
        );
        self.ctx.events.publish(DomainEvent::ReconciliationFlagged {
            tenant_id: tenant.clone(),
            event_id: event.id,
            charge_ref: event.charge_ref,
            detail,
            flagged_at: now,
        });
        Ok(ReconcileOutcome::NeedsReview)
    }

    async fn apply(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant: &TenantId,
        event: &GatewayEvent,
        events: &mut Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        // A missing row is gap-locked, so the issuer cannot record this charge until we commit.
        let Some(payment) = tx
            .find_payment_by_charge(tenant, &event.charge_ref)
            .await?
        else {
            warn!(
                tenant_id = %tenant,
                event_id = %event.id,
                charge_ref = %event.charge_ref,
                "Gateway event for unknown charge deferred"
            );
            let detail = format!("no payment recorded for charge {}", event.charge_ref);
            events.push(DomainEvent::ReconciliationFlagged {
                tenant_id: tenant.clone(),
                event_id: event.id.clone(),
                charge_ref: event.charge_ref.clone(),
                detail: detail.clone(),
                flagged_at: now,
            });
            return Ok((ReconcileOutcome::Deferred, Some(detail)));
        };

        if event.currency != payment.currency {
            return Err(AppError::inconsistency(format!(
                "Event currency {} does not match payment currency {}",
                event.currency, payment.currency
            )));
        }
        if payment.has_processed(&event.id) {
            return Ok((ReconcileOutcome::Duplicate, Some("already applied".to_string())));
        }

        match event.event_type {
            GatewayEventType::ChargeSucceeded => {
                self.charge_succeeded(tx, tenant, payment, event, events, now)
                    .await
            }
            GatewayEventType::ChargeFailed => {
                self.charge_failed(tx, tenant, payment, event, events, now)
                    .await
            }
            GatewayEventType::RefundIssued => {
                self.refund_issued(tx, tenant, payment, event, events, now)
                    .await
            }
        }
    }

    async fn charge_succeeded(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant: &TenantId,
        mut payment: Payment,
        event: &GatewayEvent,
        events: &mut Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        if payment.status.is_settled() {
            return Ok((
                ReconcileOutcome::Duplicate,
                Some(format!("payment {} already settled", payment.id)),
            ));
        }
        if event.amount != payment.amount {
            return Err(AppError::inconsistency(format!(
                "Settled amount {} does not match charged amount {}",
                event.amount, payment.amount
            )));
        }

        let mut entry = entry_or_not_found(tx, tenant, payment.schedule_entry_id).await?;
        match entry.status {
            ScheduleStatus::Paid => {
                return Err(AppError::inconsistency(format!(
                    "Schedule entry {} is already paid by another payment",
                    entry.id
                )))
            }
            ScheduleStatus::Cancelled => {
                return Err(AppError::inconsistency(format!(
                    "Schedule entry {} was cancelled before its charge settled",
                    entry.id
                )))
            }
            _ => {}
        }

        payment.mark_paid(now);
        payment.processed_events.push(event.id.clone());
        entry.transition(ScheduleStatus::Paid, now)?;
        tx.update_entry(&mut entry).await?;

        let refunds = tx
            .find_deferred_events(tenant, &event.charge_ref)
            .await?
            .into_iter()
            .filter(|d| d.event.event_type == GatewayEventType::RefundIssued);
        for mut deferred in refunds {
            match apply_gateway_refund(&mut payment, &deferred.event, now) {
                Ok(applied) => {
                    deferred.finish(
                        WebhookEventStatus::Processed,
                        Some("replayed after settlement".to_string()),
                        now,
                    );
                    info!(
                        tenant_id = %tenant,
                        event_id = %deferred.event.id,
                        amount = %applied,
                        "Replayed deferred refund"
                    );
                    events.push(refunded_event(
                        &payment,
                        applied,
                        Some(deferred.event.refund_key().to_string()),
                    ));
                }
                // The settlement itself stands; only the refund needs a look.
                Err(AppError::ReconciliationInconsistency(detail)) => {
                    warn!(
                        tenant_id = %tenant,
                        event_id = %deferred.event.id,
                        detail = %detail,
                        "Deferred refund could not be replayed"
                    );
                    deferred.finish(WebhookEventStatus::NeedsReview, Some(detail), now);
                }
                Err(e) => return Err(e),
            }
            tx.save_webhook_event(&deferred).await?;
        }
        tx.update_payment(&payment).await?;

        let mut enrollment = enrollment_or_not_found(tx, tenant, payment.enrollment_id).await?;
        let change = refresh_totals(tx, &mut enrollment, now).await?;

        // Settlement first, then any replayed refunds, then completion.
        events.insert(
            0,
            DomainEvent::PaymentSettled {
                tenant_id: tenant.clone(),
                enrollment_id: enrollment.id,
                entry_id: entry.id,
                payment_id: payment.id,
                amount: payment.amount,
            },
        );
        if change.completed() {
            events.push(DomainEvent::EnrollmentCompleted {
                tenant_id: tenant.clone(),
                enrollment_id: enrollment.id,
                paid_amount: enrollment.paid_amount,
            });
        }

        Ok((ReconcileOutcome::Applied, None))
    }

    async fn charge_failed(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant: &TenantId,
        mut payment: Payment,
        event: &GatewayEvent,
        events: &mut Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Failed => {
                return Ok((
                    ReconcileOutcome::Duplicate,
                    Some(format!("payment {} already failed", payment.id)),
                ))
            }
            status => {
                return Err(AppError::inconsistency(format!(
                    "Failure reported for payment {} in status {}",
                    payment.id, status
                )))
            }
        }

        payment.mark_failed(now);
        payment.processed_events.push(event.id.clone());
        tx.update_payment(&payment).await?;

        let mut entry = entry_or_not_found(tx, tenant, payment.schedule_entry_id).await?;
        entry.failed_attempts += 1;
        entry.updated_at = now;
        let exhausted = entry.failed_attempts >= self.ctx.settings.max_charge_attempts
            && entry.status.can_transition_to(ScheduleStatus::Failed);
        if exhausted {
            entry.transition(ScheduleStatus::Failed, now)?;
        }
        tx.update_entry(&mut entry).await?;

        events.push(DomainEvent::PaymentFailed {
            tenant_id: tenant.clone(),
            enrollment_id: payment.enrollment_id,
            entry_id: entry.id,
            payment_id: payment.id,
            attempts: entry.failed_attempts,
            reason: event.reason.clone(),
        });
        if exhausted {
            warn!(
                tenant_id = %tenant,
                entry_id = %entry.id,
                attempts = entry.failed_attempts,
                "Charge attempts exhausted"
            );
            events.push(DomainEvent::RetriesExhausted {
                tenant_id: tenant.clone(),
                enrollment_id: payment.enrollment_id,
                entry_id: entry.id,
                attempts: entry.failed_attempts,
            });
        }

        Ok((ReconcileOutcome::Applied, None))
    }

    async fn refund_issued(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant: &TenantId,
        mut payment: Payment,
        event: &GatewayEvent,
        events: &mut Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let refund_ref = event.refund_key().to_string();
        if payment.has_refund(&refund_ref) {
            return Ok((
                ReconcileOutcome::Duplicate,
                Some(format!("refund {} already recorded", refund_ref)),
            ));
        }

        match payment.status {
            PaymentStatus::Pending => {
                let detail = format!(
                    "refund {} received before charge {} settled",
                    refund_ref, event.charge_ref
                );
                events.push(DomainEvent::ReconciliationFlagged {
                    tenant_id: tenant.clone(),
                    event_id: event.id.clone(),
                    charge_ref: event.charge_ref.clone(),
                    detail: detail.clone(),
                    flagged_at: now,
                });
                return Ok((ReconcileOutcome::Deferred, Some(detail)));
            }
            PaymentStatus::Failed => {
                return Err(AppError::inconsistency(format!(
                    "Refund {} reported for failed payment {}",
                    refund_ref, payment.id
                )))
            }
            _ => {}
        }

        let applied = apply_gateway_refund(&mut payment, event, now)?;
        payment.processed_events.push(event.id.clone());
        tx.update_payment(&payment).await?;

        let mut enrollment = enrollment_or_not_found(tx, tenant, payment.enrollment_id).await?;
        refresh_totals(tx, &mut enrollment, now).await?;

        events.push(refunded_event(&payment, applied, Some(refund_ref)));
        Ok((ReconcileOutcome::Applied, None))
    }
}

type Applied = (ReconcileOutcome, Option<String>);

/// Record a refund the gateway has already executed, capped at what is still refundable
fn apply_gateway_refund(
    payment: &mut Payment,
    event: &GatewayEvent,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    if payment.refundable_amount() <= Decimal::ZERO {
        return Err(AppError::inconsistency(format!(
            "Refund {} exceeds what remains on payment {}",
            event.amount, payment.id
        )));
    }

    let applied = payment.apply_refund(
        event.amount,
        event.reason.clone(),
        Some(event.refund_key().to_string()),
        RefundSource::Gateway,
        "gateway",
        now,
    )?;
    if applied < event.amount {
        warn!(
            payment_id = %payment.id,
            requested = %event.amount,
            applied = %applied,
            "Gateway refund capped at refundable amount"
        );
    }
    Ok(applied)
}

fn refunded_event(payment: &Payment, amount: Decimal, refund_ref: Option<String>) -> DomainEvent {
    DomainEvent::PaymentRefunded {
        tenant_id: payment.tenant_id.clone(),
        enrollment_id: payment.enrollment_id,
        payment_id: payment.id,
        amount,
        refunded_total: payment.refunded_amount,
        external_refund_id: refund_ref,
    }
}
