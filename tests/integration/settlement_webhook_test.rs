// Integration tests for settlement webhooks: idempotent replay, failure handling, deferred
// refunds and the review path for inconsistent events.

#[path = "../helpers/mod.rs"]
mod helpers;

use enrollpay::core::{AppError, TenantId};
use enrollpay::modules::enrollments::EnrollmentStatus;
use enrollpay::modules::events::DomainEvent;
use enrollpay::modules::gateways::HttpGateway;
use enrollpay::modules::invoices::IssueMode;
use enrollpay::modules::payments::PaymentStatus;
use enrollpay::modules::plans::models::PlanTerms;
use enrollpay::modules::schedules::models::AdminRefund;
use enrollpay::modules::schedules::{ScheduleStatus, ScheduleView};
use enrollpay::modules::settlements::{ReconcileOutcome, WebhookEventStatus};
use helpers::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn one_time(t: &TestEngine, tenant: &TenantId) -> ScheduleView {
    t.engine
        .schedules
        .create_enrollment_schedule(tenant, create_cmd(dec!(100), PlanTerms::OneTime))
        .await
        .unwrap()
}

async fn issue(t: &TestEngine, tenant: &TenantId, view: &ScheduleView, mode: IssueMode) -> String {
    t.engine
        .invoices
        .issue(tenant, view.entry(1).unwrap().entry.id, mode)
        .await
        .unwrap()
        .payment
        .external_charge_id
        .unwrap()
}

async fn reload(t: &TestEngine, tenant: &TenantId, view: &ScheduleView) -> ScheduleView {
    t.engine
        .schedules
        .get_schedule(tenant, view.enrollment.id)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_charge_succeeded_settles_entry_once() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
    let mut rx = t.subscribe();

    let event = succeeded("evt_1", &charge, dec!(100));
    let first = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event.clone())
        .await
        .unwrap();
    assert_eq!(first, ReconcileOutcome::Applied);

    let settled = reload(&t, &acme, &view).await;
    assert_eq!(settled.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
    assert!(settled.entry(1).unwrap().entry.paid_date.is_some());
    assert_eq!(settled.payments[0].status, PaymentStatus::Paid);
    assert_eq!(settled.enrollment.paid_amount, dec!(100));
    assert_eq!(settled.enrollment.payment_status, EnrollmentStatus::Completed);
    assert_eq!(
        event_names(&drain(&mut rx)),
        vec!["payment.settled", "enrollment.completed"]
    );

    // Same event id again
    let replay = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event.clone())
        .await
        .unwrap();
    assert_eq!(replay, ReconcileOutcome::Duplicate);

    // A late duplicate with a fresh event id
    let late = t
        .engine
        .settlements
        .apply_gateway_event(&acme, succeeded("evt_2", &charge, dec!(100)))
        .await
        .unwrap();
    assert_eq!(late, ReconcileOutcome::Duplicate);

    let after = reload(&t, &acme, &view).await;
    assert_eq!(after.enrollment.paid_amount, dec!(100));
    assert_eq!(after.payments.len(), 1);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(t.ledger_status(&acme, &event).await, WebhookEventStatus::Processed);
}

#[tokio::test]
async fn test_concurrent_deliveries_apply_once() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
    let event = succeeded("evt_concurrent", &charge, dec!(100));

    let settlements = &t.engine.settlements;
    let (a, b, c) = tokio::join!(
        settlements.apply_gateway_event(&acme, event.clone()),
        settlements.apply_gateway_event(&acme, event.clone()),
        settlements.apply_gateway_event(&acme, event.clone()),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == ReconcileOutcome::Applied)
            .count(),
        1
    );
    assert_eq!(reload(&t, &acme, &view).await.enrollment.paid_amount, dec!(100));
}

#[tokio::test]
async fn test_failed_charge_leaves_entry_retryable() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let first_charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, failed("evt_fail", &first_charge, dec!(100)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let after_failure = reload(&t, &acme, &view).await;
    let entry = &after_failure.entry(1).unwrap().entry;
    assert_eq!(entry.status, ScheduleStatus::Pending);
    assert_eq!(entry.failed_attempts, 1);
    assert_eq!(after_failure.payments[0].status, PaymentStatus::Failed);

    let retry_charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
    assert_ne!(retry_charge, first_charge);
    let charges = t.gateway.charges();
    assert_ne!(charges[0].idempotency_key, charges[1].idempotency_key);

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, succeeded("evt_ok", &retry_charge, dec!(100)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let paid = reload(&t, &acme, &view).await;
    assert_eq!(paid.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
    assert_eq!(paid.payments.len(), 2);
    assert_eq!(paid.enrollment.paid_amount, dec!(100));
}

#[tokio::test]
async fn test_exhausted_retries_surface_for_admin() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let mut rx = t.subscribe();

    for attempt in 1..=3 {
        let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
        t.engine
            .settlements
            .apply_gateway_event(&acme, failed(&format!("evt_fail_{}", attempt), &charge, dec!(100)))
            .await
            .unwrap();
    }

    let exhausted = reload(&t, &acme, &view).await;
    let entry = &exhausted.entry(1).unwrap().entry;
    assert_eq!(entry.status, ScheduleStatus::Failed);
    assert_eq!(entry.failed_attempts, 3);
    assert_ne!(exhausted.enrollment.payment_status, EnrollmentStatus::Cancelled);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::RetriesExhausted { attempts: 3, .. })));

    let scheduled = t
        .engine
        .invoices
        .issue(&acme, entry.id, IssueMode::Scheduled)
        .await;
    assert!(matches!(scheduled, Err(AppError::Conflict(_))));

    // An operator can still charge it
    let forced = t
        .engine
        .invoices
        .issue(&acme, entry.id, IssueMode::ChargeNow)
        .await
        .unwrap();
    assert_eq!(forced.entry.status, ScheduleStatus::Pending);
}

#[tokio::test]
async fn test_amount_mismatch_is_flagged_and_state_preserved() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
    let mut rx = t.subscribe();

    let event = succeeded("evt_bad_amount", &charge, dec!(99));
    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event.clone())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::NeedsReview);

    let after = reload(&t, &acme, &view).await;
    assert_eq!(after.entry(1).unwrap().entry.status, ScheduleStatus::Pending);
    assert_eq!(after.payments[0].status, PaymentStatus::Pending);
    assert_eq!(after.enrollment.paid_amount, Decimal::ZERO);

    let record = t.ledger(&acme, &event).await;
    assert_eq!(record.status, WebhookEventStatus::NeedsReview);
    assert!(record.detail.unwrap().contains("does not match"));
    assert_eq!(event_names(&drain(&mut rx)), vec!["reconciliation.flagged"]);

    let again = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event)
        .await
        .unwrap();
    assert_eq!(again, ReconcileOutcome::Duplicate);
}

#[tokio::test]
async fn test_currency_mismatch_needs_review() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;

    let mut event = succeeded("evt_eur", &charge, dec!(100));
    event.currency = "EUR".parse().unwrap();
    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::NeedsReview);
    assert_eq!(
        reload(&t, &acme, &view).await.entry(1).unwrap().entry.status,
        ScheduleStatus::Pending
    );
}

#[tokio::test]
async fn test_refund_before_success_is_deferred_then_replayed() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;
    let mut rx = t.subscribe();

    let refund = refunded("evt_refund", &charge, "rf_early", dec!(40));
    let early = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refund.clone())
        .await
        .unwrap();
    assert_eq!(early, ReconcileOutcome::Deferred);
    assert_eq!(t.ledger_status(&acme, &refund).await, WebhookEventStatus::Deferred);
    assert_eq!(event_names(&drain(&mut rx)), vec!["reconciliation.flagged"]);

    let before = reload(&t, &acme, &view).await;
    assert_eq!(before.payments[0].status, PaymentStatus::Pending);
    assert_eq!(before.payments[0].refunded_amount, Decimal::ZERO);

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, succeeded("evt_paid", &charge, dec!(100)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let after = reload(&t, &acme, &view).await;
    let payment = &after.payments[0];
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(payment.refunded_amount, dec!(40));
    assert!(payment.has_refund("rf_early"));
    assert_eq!(after.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
    assert_eq!(after.enrollment.paid_amount, dec!(60));
    assert_eq!(t.ledger_status(&acme, &refund).await, WebhookEventStatus::Processed);

    let names = event_names(&drain(&mut rx));
    assert_eq!(names[0], "payment.settled");
    assert!(names.contains(&"payment.refunded"));
}

#[tokio::test]
async fn test_success_for_unrecorded_charge_is_applied_on_issue() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let upcoming = t.gateway.peek_ref("ch");
    let mut rx = t.subscribe();

    let event = succeeded("evt_fast", &upcoming, dec!(100));
    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, event.clone())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deferred);
    assert_eq!(t.ledger_status(&acme, &event).await, WebhookEventStatus::Deferred);
    assert_eq!(event_names(&drain(&mut rx)), vec!["reconciliation.flagged"]);

    let issued = t
        .engine
        .invoices
        .issue(&acme, view.entry(1).unwrap().entry.id, IssueMode::Scheduled)
        .await
        .unwrap();
    assert_eq!(issued.payment.external_charge_id.as_deref(), Some(upcoming.as_str()));
    assert_eq!(issued.entry.status, ScheduleStatus::Paid);
    assert_eq!(issued.payment.status, PaymentStatus::Paid);
    assert_eq!(t.ledger_status(&acme, &event).await, WebhookEventStatus::Processed);
}

#[tokio::test]
async fn test_refund_without_reference_is_keyed_by_event_id() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = t
        .charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;

    let mut refund = refunded("evt_rf_plain", &charge, "unused", dec!(40));
    refund.refund_ref = None;
    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refund.clone())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert_eq!(t.ledger_status(&acme, &refund).await, WebhookEventStatus::Processed);

    let after = reload(&t, &acme, &view).await;
    let payment = &after.payments[0];
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(payment.refunded_amount, dec!(40));
    assert!(payment.has_refund("evt_rf_plain"));
    assert_eq!(after.enrollment.paid_amount, dec!(60));

    let again = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refund)
        .await
        .unwrap();
    assert_eq!(again, ReconcileOutcome::Duplicate);
    assert_eq!(reload(&t, &acme, &view).await.payments[0].refunded_amount, dec!(40));
}

#[tokio::test]
async fn test_refund_webhook_for_admin_refund_is_noop() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = t
        .charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;
    let payment_id = reload(&t, &acme, &view).await.payments[0].id;

    let refunded_payment = t
        .engine
        .schedules
        .refund_payment(
            &acme,
            payment_id,
            AdminRefund {
                amount: dec!(30),
                reason: Some("goodwill".to_string()),
                actor: "admin@acme".to_string(),
            },
        )
        .await
        .unwrap();
    let refund_ref = refunded_payment.refund_history[0]
        .external_refund_id
        .clone()
        .unwrap();

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refunded("evt_rf", &charge, &refund_ref, dec!(30)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Duplicate);

    let after = reload(&t, &acme, &view).await;
    assert_eq!(after.payments[0].refunded_amount, dec!(30));
    assert_eq!(after.payments[0].refund_history.len(), 1);
    assert_eq!(after.enrollment.paid_amount, dec!(70));
}

#[tokio::test]
async fn test_gateway_refund_is_capped_at_refundable() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = t
        .charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refunded("evt_big", &charge, "rf_big", dec!(150)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let after = reload(&t, &acme, &view).await;
    assert_eq!(after.payments[0].refunded_amount, dec!(100));
    assert_eq!(after.payments[0].status, PaymentStatus::Refunded);
    assert_eq!(after.enrollment.paid_amount, Decimal::ZERO);

    let more = t
        .engine
        .settlements
        .apply_gateway_event(&acme, refunded("evt_more", &charge, "rf_more", dec!(10)))
        .await
        .unwrap();
    assert_eq!(more, ReconcileOutcome::NeedsReview);
}

#[tokio::test]
async fn test_events_are_tenant_scoped() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;

    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&tenant("globex"), succeeded("evt_x", &charge, dec!(100)))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Deferred);
    assert_eq!(
        reload(&t, &acme, &view).await.entry(1).unwrap().entry.status,
        ScheduleStatus::Pending
    );
}

#[tokio::test]
async fn test_signed_webhook_is_verified_before_processing() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = one_time(&t, &acme).await;
    let charge = issue(&t, &acme, &view, IssueMode::Scheduled).await;

    let body = serde_json::to_vec(&succeeded("evt_signed", &charge, dec!(100))).unwrap();

    let forged = t
        .engine
        .settlements
        .handle_webhook(&acme, "deadbeef", &body)
        .await;
    assert!(matches!(forged, Err(AppError::Unauthorized(_))));
    assert_eq!(
        reload(&t, &acme, &view).await.entry(1).unwrap().entry.status,
        ScheduleStatus::Pending
    );

    let signature = HttpGateway::sign(WEBHOOK_SECRET, &body).unwrap();
    let outcome = t
        .engine
        .settlements
        .handle_webhook(&acme, &signature, &body)
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);
}
