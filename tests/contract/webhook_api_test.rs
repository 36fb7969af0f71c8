// HTTP contract tests for the gateway webhook and invoice endpoints.

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{http::StatusCode, test, web, App};
use enrollpay::middleware::json_error_handler;
use enrollpay::modules::gateways::{HttpGateway, SIGNATURE_HEADER};
use enrollpay::modules::invoices::IssueMode;
use enrollpay::modules::plans::models::PlanTerms;
use enrollpay::modules::schedules::ScheduleStatus;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

macro_rules! app {
    ($t:expr) => {
        test::init_service(
            App::new()
                .app_data($t.engine.clone())
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .configure(enrollpay::configure),
        )
        .await
    };
}

async fn issued_charge(t: &TestEngine) -> (uuid::Uuid, String) {
    let acme = tenant("acme");
    let view = t
        .engine
        .schedules
        .create_enrollment_schedule(&acme, create_cmd(dec!(100), PlanTerms::OneTime))
        .await
        .unwrap();
    let issued = t
        .engine
        .invoices
        .issue(&acme, view.entry(1).unwrap().entry.id, IssueMode::Scheduled)
        .await
        .unwrap();
    (view.enrollment.id, issued.payment.external_charge_id.unwrap())
}

fn signed(body: &[u8]) -> (&'static str, String) {
    (SIGNATURE_HEADER, HttpGateway::sign(WEBHOOK_SECRET, body).unwrap())
}

#[actix_web::test]
async fn test_signed_webhook_is_applied_once() {
    let t = TestEngine::new();
    let (enrollment_id, charge) = issued_charge(&t).await;
    let app = app!(t);
    let body = serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": "charge.succeeded",
        "charge_ref": charge,
        "amount": "100",
        "currency": "USD",
        "occurred_at": "2025-01-10T09:05:00Z"
    }))
    .unwrap();

    for expected in ["applied", "duplicate"] {
        let req = test::TestRequest::post()
            .uri("/webhooks/acme")
            .insert_header(signed(&body))
            .insert_header(("content-type", "application/json"))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let ack: Value = test::read_body_json(resp).await;
        assert_eq!(ack["outcome"], expected);
    }

    let view = t
        .engine
        .schedules
        .get_schedule(&tenant("acme"), enrollment_id)
        .await
        .unwrap();
    assert_eq!(view.entry(1).unwrap().entry.status, ScheduleStatus::Paid);
}

#[actix_web::test]
async fn test_bad_or_missing_signature_is_401() {
    let t = TestEngine::new();
    let (enrollment_id, charge) = issued_charge(&t).await;
    let app = app!(t);
    let body = serde_json::to_vec(&succeeded("evt_1", &charge, dec!(100))).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhooks/acme")
        .insert_header((SIGNATURE_HEADER, "00ff"))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"]["kind"], "unauthorized");

    let req = test::TestRequest::post()
        .uri("/webhooks/acme")
        .set_payload(body)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let view = t
        .engine
        .schedules
        .get_schedule(&tenant("acme"), enrollment_id)
        .await
        .unwrap();
    assert_eq!(view.entry(1).unwrap().entry.status, ScheduleStatus::Pending);
}

#[actix_web::test]
async fn test_signed_garbage_is_400() {
    let t = TestEngine::new();
    let app = app!(t);
    let body = b"{\"id\": \"evt_1\"}".to_vec();

    let req = test::TestRequest::post()
        .uri("/webhooks/acme")
        .insert_header(signed(&body))
        .set_payload(body)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn test_inconsistent_event_is_acknowledged_for_review() {
    let t = TestEngine::new();
    let (_, charge) = issued_charge(&t).await;
    let app = app!(t);
    let body = serde_json::to_vec(&succeeded("evt_short", &charge, dec!(90))).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhooks/acme")
        .insert_header(signed(&body))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["outcome"], "needs_review");
}

#[actix_web::test]
async fn test_charge_due_scan_and_numbers_over_http() {
    let t = TestEngine::new();
    let acme = tenant("acme");
    let view = t
        .engine
        .schedules
        .create_enrollment_schedule(&acme, create_cmd(dec!(1200), deposit_plan()))
        .await
        .unwrap();
    let last = view.entry(5).unwrap().entry.id;
    let app = app!(t);

    let req = test::TestRequest::post()
        .uri(&format!("/tenants/acme/schedule-entries/{}/charge", last))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let issued: Value = test::read_body_json(resp).await;
    assert_eq!(issued["payment"]["status"], "pending");
    assert_eq!(issued["payment"]["external_charge_id"], "ch_1");

    let req = test::TestRequest::post()
        .uri("/tenants/acme/due-scan")
        .set_json(json!({"as_of": "2025-02-10"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["scanned"], 2);
    assert_eq!(summary["issued"], 2);

    let req = test::TestRequest::post()
        .uri("/tenants/acme/invoice-numbers")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let number: Value = test::read_body_json(resp).await;
    assert_eq!(number["value"], "INV-2025-000002");
}
