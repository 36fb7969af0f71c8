use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::{Result, TenantId};
use crate::modules::schedules::models::{
    AdjustDate, AdminRefund, CancelEnrollment, CreateSchedule, ManualPayment, PauseEnrollment,
    ResumeEnrollment,
};
use crate::modules::BillingEngine;

#[derive(Debug, Default, Deserialize)]
pub struct ExtendRequest {
    #[serde(default)]
    pub periods: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsOfRequest {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

fn tenant_and_id(path: web::Path<(String, Uuid)>) -> Result<(TenantId, Uuid)> {
    let (tenant_id, id) = path.into_inner();
    Ok((TenantId::new(tenant_id)?, id))
}

/// POST /tenants/{tenant_id}/enrollments
///
/// Creates the enrollment, allocates its invoice number and generates its schedule.
/// Repeating the request with the same `enrollment_id` returns the existing schedule.
///
/// # Request Body
/// ```json
/// {
///   "enrollment_id": "6f1c...",
///   "user_id": "user-42",
///   "product_id": "course-7",
///   "price": "1200.00",
///   "currency": "USD",
///   "plan": {"plan_type": "one_time"}
/// }
/// ```
///
/// # Returns
/// - 201: Schedule view
/// - 400: Invalid price, currency or plan
/// - 404: Referenced payment plan not found
/// - 409: Enrollment id reused with different terms
pub async fn create_enrollment(
    tenant_id: web::Path<String>,
    request: web::Json<CreateSchedule>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;

    let view = engine
        .schedules
        .create_enrollment_schedule(&tenant, request.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(view))
}

/// GET /tenants/{tenant_id}/enrollments/{enrollment_id}
///
/// Returns the enrollment, its entries with their effective status, and its payments.
pub async fn get_schedule(
    path: web::Path<(String, Uuid)>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, enrollment_id) = tenant_and_id(path)?;

    let view = engine.schedules.get_schedule(&tenant, enrollment_id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /tenants/{tenant_id}/enrollments/{enrollment_id}/pause
pub async fn pause_enrollment(
    path: web::Path<(String, Uuid)>,
    request: web::Json<PauseEnrollment>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, enrollment_id) = tenant_and_id(path)?;

    let view = engine
        .schedules
        .pause(&tenant, enrollment_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /tenants/{tenant_id}/enrollments/{enrollment_id}/resume
pub async fn resume_enrollment(
    path: web::Path<(String, Uuid)>,
    request: web::Json<ResumeEnrollment>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, enrollment_id) = tenant_and_id(path)?;

    let view = engine
        .schedules
        .resume(&tenant, enrollment_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /tenants/{tenant_id}/enrollments/{enrollment_id}/cancel
///
/// # Returns
/// - 200: Cancellation outcome; refunds the gateway rejected are listed under `pending_refunds`
/// - 400: Refund amount negative or above what was paid
/// - 409: Enrollment already cancelled
pub async fn cancel_enrollment(
    path: web::Path<(String, Uuid)>,
    request: web::Json<CancelEnrollment>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, enrollment_id) = tenant_and_id(path)?;

    let outcome = engine
        .schedules
        .cancel_enrollment(&tenant, enrollment_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /tenants/{tenant_id}/enrollments/{enrollment_id}/extend
///
/// Appends subscription periods. The body is optional.
pub async fn extend_subscription(
    path: web::Path<(String, Uuid)>,
    request: Option<web::Json<ExtendRequest>>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, enrollment_id) = tenant_and_id(path)?;
    let periods = request.and_then(|r| r.into_inner().periods);

    let view = engine
        .schedules
        .extend_subscription(&tenant, enrollment_id, periods)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// PATCH /tenants/{tenant_id}/schedule-entries/{entry_id}/date
///
/// # Returns
/// - 200: Updated entry with the adjustment appended to its history
/// - 400: Date in the past or missing reason
/// - 409: Entry not adjustable or `expected_version` is stale
pub async fn adjust_date(
    path: web::Path<(String, Uuid)>,
    request: web::Json<AdjustDate>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, entry_id) = tenant_and_id(path)?;

    let entry = engine
        .schedules
        .adjust_date(&tenant, entry_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// POST /tenants/{tenant_id}/schedule-entries/{entry_id}/manual-payment
pub async fn record_manual_payment(
    path: web::Path<(String, Uuid)>,
    request: web::Json<ManualPayment>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, entry_id) = tenant_and_id(path)?;

    let payment = engine
        .schedules
        .record_manual_payment(&tenant, entry_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(payment))
}

/// POST /tenants/{tenant_id}/payments/{payment_id}/refunds
pub async fn refund_payment(
    path: web::Path<(String, Uuid)>,
    request: web::Json<AdminRefund>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant, payment_id) = tenant_and_id(path)?;

    let payment = engine
        .schedules
        .refund_payment(&tenant, payment_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(payment))
}

/// POST /tenants/{tenant_id}/overdue-refresh
pub async fn refresh_overdue(
    tenant_id: web::Path<String>,
    request: Option<web::Json<AsOfRequest>>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;
    let as_of = request.and_then(|r| r.into_inner().as_of);

    let summary = engine.schedules.refresh_overdue(&tenant, as_of).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Configure schedule routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tenants/{tenant_id}/enrollments").route(web::post().to(create_enrollment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/enrollments/{enrollment_id}")
            .route(web::get().to(get_schedule)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/enrollments/{enrollment_id}/pause")
            .route(web::post().to(pause_enrollment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/enrollments/{enrollment_id}/resume")
            .route(web::post().to(resume_enrollment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/enrollments/{enrollment_id}/cancel")
            .route(web::post().to(cancel_enrollment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/enrollments/{enrollment_id}/extend")
            .route(web::post().to(extend_subscription)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/schedule-entries/{entry_id}/date")
            .route(web::patch().to(adjust_date)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/schedule-entries/{entry_id}/manual-payment")
            .route(web::post().to(record_manual_payment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/payments/{payment_id}/refunds")
            .route(web::post().to(refund_payment)),
    )
    .service(
        web::resource("/tenants/{tenant_id}/overdue-refresh")
            .route(web::post().to(refresh_overdue)),
    );
}
