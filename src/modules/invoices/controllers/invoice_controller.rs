use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::{Result, TenantId};
use crate::modules::invoices::services::IssueMode;
use crate::modules::BillingEngine;

#[derive(Debug, Default, Deserialize)]
pub struct DueScanRequest {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// POST /tenants/{tenant_id}/schedule-entries/{entry_id}/charge
///
/// Charges the entry immediately, including one whose scheduled retries are exhausted.
///
/// # Returns
/// - 201: Entry and the pending payment recorded for the new charge
/// - 409: Entry paid, cancelled, paused or already charged
/// - 502: Gateway rejected the charge
pub async fn charge_now(
    path: web::Path<(String, Uuid)>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant_id, entry_id) = path.into_inner();
    let tenant = TenantId::new(tenant_id)?;

    let issued = engine
        .invoices
        .issue(&tenant, entry_id, IssueMode::ChargeNow)
        .await?;
    Ok(HttpResponse::Created().json(issued))
}

/// POST /tenants/{tenant_id}/due-scan
///
/// Issues every entry due on or before `as_of` (default today).
pub async fn issue_due(
    tenant_id: web::Path<String>,
    request: Option<web::Json<DueScanRequest>>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;
    let as_of = request.and_then(|r| r.into_inner().as_of);

    let summary = engine.invoices.issue_due(&tenant, as_of).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// POST /tenants/{tenant_id}/invoice-numbers
///
/// Allocates the next invoice number in the tenant's sequence.
pub async fn allocate_invoice_number(
    tenant_id: web::Path<String>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;

    let number = engine.invoice_numbers.allocate(&tenant).await?;
    Ok(HttpResponse::Created().json(number))
}

/// Configure invoice routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tenants/{tenant_id}/schedule-entries/{entry_id}/charge")
            .route(web::post().to(charge_now)),
    )
    .service(web::resource("/tenants/{tenant_id}/due-scan").route(web::post().to(issue_due)))
    .service(
        web::resource("/tenants/{tenant_id}/invoice-numbers")
            .route(web::post().to(allocate_invoice_number)),
    );
}
