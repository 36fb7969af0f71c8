// Integration tests for enrollment cancellation and admin refunds.

#[path = "../helpers/mod.rs"]
mod helpers;

use enrollpay::core::AppError;
use enrollpay::modules::enrollments::EnrollmentStatus;
use enrollpay::modules::events::DomainEvent;
use enrollpay::modules::invoices::IssueMode;
use enrollpay::modules::payments::PaymentStatus;
use enrollpay::modules::schedules::models::{AdminRefund, CancelEnrollment, ManualPayment};
use enrollpay::modules::schedules::{ScheduleStatus, ScheduleView};
use enrollpay::modules::settlements::ReconcileOutcome;
use helpers::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn cancel(refund_amount: Decimal) -> CancelEnrollment {
    CancelEnrollment {
        actor: "admin@acme".to_string(),
        reason: Some("student withdrew".to_string()),
        refund_amount,
    }
}

async fn deposit_enrollment(t: &TestEngine) -> ScheduleView {
    t.engine
        .schedules
        .create_enrollment_schedule(&tenant("acme"), create_cmd(dec!(1200), deposit_plan()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cancel_after_deposit_refunds_and_cancels_remaining() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;
    let charge = t
        .charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;
    let mut rx = t.subscribe();

    let outcome = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(dec!(240)))
        .await
        .unwrap();

    assert_eq!(outcome.cancelled_entries, 4);
    assert_eq!(outcome.refunded_amount, dec!(240));
    assert!(outcome.pending_refunds.is_empty());
    assert_eq!(outcome.enrollment.payment_status, EnrollmentStatus::Cancelled);
    assert_eq!(outcome.enrollment.paid_amount, Decimal::ZERO);
    assert_eq!(outcome.enrollment.total_amount, dec!(240));

    let refunds = t.gateway.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].charge_ref, charge);
    assert_eq!(refunds[0].amount, dec!(240));

    let after = t
        .engine
        .schedules
        .get_schedule(&acme, view.enrollment.id)
        .await
        .unwrap();
    assert_eq!(after.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
    for n in 2..=5 {
        assert_eq!(after.entry(n).unwrap().entry.status, ScheduleStatus::Cancelled);
    }
    let payment = &after.payments[0];
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, dec!(240));
    assert_eq!(payment.refund_reason.as_deref(), Some("student withdrew"));

    assert_eq!(
        event_names(&drain(&mut rx)),
        vec!["enrollment.cancelled", "payment.refunded"]
    );
}

#[tokio::test]
async fn test_cancel_without_refund() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;

    let outcome = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(Decimal::ZERO))
        .await
        .unwrap();

    assert_eq!(outcome.cancelled_entries, 5);
    assert_eq!(outcome.refunded_amount, Decimal::ZERO);
    assert!(t.gateway.refunds().is_empty());
}

#[tokio::test]
async fn test_cancel_rejects_over_refund_and_changes_nothing() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;
    t.charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;

    let result = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(dec!(240.01)))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let after = t
        .engine
        .schedules
        .get_schedule(&acme, view.enrollment.id)
        .await
        .unwrap();
    assert_eq!(after.enrollment.payment_status, EnrollmentStatus::Active);
    assert_eq!(after.entry(2).unwrap().entry.status, ScheduleStatus::Pending);
    assert!(t.gateway.refunds().is_empty());
}

#[tokio::test]
async fn test_cancel_twice_conflicts() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;

    t.engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(Decimal::ZERO))
        .await
        .unwrap();
    let again = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(Decimal::ZERO))
        .await;

    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_failed_refund_is_reported_not_rolled_back() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;
    t.charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;
    t.gateway.fail_refunds(true);

    let outcome = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(dec!(100)))
        .await
        .unwrap();

    assert_eq!(outcome.enrollment.payment_status, EnrollmentStatus::Cancelled);
    assert_eq!(outcome.refunded_amount, Decimal::ZERO);
    assert_eq!(outcome.pending_refunds.len(), 1);
    assert_eq!(outcome.pending_refunds[0].amount, dec!(100));
    assert!(outcome.pending_refunds[0].error.contains("refund rejected"));

    // The operator retries once the gateway recovers
    t.gateway.fail_refunds(false);
    let payment = t
        .engine
        .schedules
        .refund_payment(
            &acme,
            outcome.pending_refunds[0].payment_id,
            AdminRefund {
                amount: dec!(100),
                reason: None,
                actor: "admin@acme".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(payment.refunded_amount, dec!(100));
}

#[tokio::test]
async fn test_cancellation_refunds_newest_payment_first() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;
    let deposit_charge = t
        .charge_and_settle(&acme, view.entry(1).unwrap().entry.id)
        .await;
    t.clock.set(at(2025, 2, 10));
    let second_charge = t
        .charge_and_settle(&acme, view.entry(2).unwrap().entry.id)
        .await;

    let outcome = t
        .engine
        .schedules
        .cancel_enrollment(&acme, view.enrollment.id, cancel(dec!(300)))
        .await
        .unwrap();
    assert_eq!(outcome.refunded_amount, dec!(300));
    assert_eq!(outcome.cancelled_entries, 3);

    let refunds: Vec<_> = t
        .gateway
        .refunds()
        .into_iter()
        .map(|r| (r.charge_ref, r.amount))
        .collect();
    assert_eq!(
        refunds,
        vec![(second_charge, dec!(240)), (deposit_charge, dec!(60))]
    );
    assert_eq!(outcome.enrollment.paid_amount, dec!(180));
}

#[tokio::test]
async fn test_manual_payment_refund_skips_gateway() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;

    let manual = t
        .engine
        .schedules
        .record_manual_payment(
            &acme,
            view.entry(1).unwrap().entry.id,
            ManualPayment {
                payment_method: "bank_transfer".to_string(),
                transaction_reference: Some("TRX-991".to_string()),
                actor: "admin@acme".to_string(),
                expected_version: None,
            },
        )
        .await
        .unwrap();

    let refunded = t
        .engine
        .schedules
        .refund_payment(
            &acme,
            manual.id,
            AdminRefund {
                amount: dec!(40),
                reason: Some("fee waived".to_string()),
                actor: "admin@acme".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(t.gateway.refunds().is_empty());
    assert_eq!(refunded.refunded_amount, dec!(40));
    assert!(refunded.refund_history[0].external_refund_id.is_none());
}

#[tokio::test]
async fn test_admin_refund_rules() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = deposit_enrollment(&t).await;
    let entry = view.entry(1).unwrap().entry.id;

    let issued = t
        .engine
        .invoices
        .issue(&acme, entry, IssueMode::ChargeNow)
        .await
        .unwrap();
    let refund = |amount| AdminRefund {
        amount,
        reason: None,
        actor: "admin@acme".to_string(),
    };

    // Not settled yet
    let pending = t
        .engine
        .schedules
        .refund_payment(&acme, issued.payment.id, refund(dec!(10)))
        .await;
    assert!(matches!(pending, Err(AppError::Conflict(_))));

    let charge = issued.payment.external_charge_id.clone().unwrap();
    let outcome = t
        .engine
        .settlements
        .apply_gateway_event(&acme, succeeded("evt_1", &charge, dec!(240)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let zero = t
        .engine
        .schedules
        .refund_payment(&acme, issued.payment.id, refund(Decimal::ZERO))
        .await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let too_much = t
        .engine
        .schedules
        .refund_payment(&acme, issued.payment.id, refund(dec!(241)))
        .await;
    assert!(matches!(too_much, Err(AppError::Validation(_))));

    let mut rx = t.subscribe();
    let partial = t
        .engine
        .schedules
        .refund_payment(&acme, issued.payment.id, refund(dec!(40)))
        .await
        .unwrap();
    assert_eq!(partial.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.refundable_amount(), dec!(200));
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [DomainEvent::PaymentRefunded { refunded_total, .. }] if *refunded_total == dec!(40)
    ));

    let after = t
        .engine
        .schedules
        .get_schedule(&acme, view.enrollment.id)
        .await
        .unwrap();
    assert_eq!(after.enrollment.paid_amount, dec!(200));
    // Refunds never reopen a paid entry
    assert_eq!(after.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
}
