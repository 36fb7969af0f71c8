use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::core::{Result, TenantId};
use crate::modules::plans::models::PlanTerms;
use crate::modules::BillingEngine;

/// Request for POST /tenants/{tenant_id}/plans
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub terms: PlanTerms,
}

/// Request for PUT /tenants/{tenant_id}/plans/{plan_id}
#[derive(Debug, Deserialize)]
pub struct RevisePlanRequest {
    pub terms: PlanTerms,
}

/// POST /tenants/{tenant_id}/plans
///
/// # Request Body
/// ```json
/// {
///   "name": "Four monthly installments",
///   "terms": {
///     "plan_type": "deposit_installments",
///     "deposit": {"deposit_type": "percentage", "value": "20"},
///     "installment_count": 4,
///     "frequency": "monthly"
///   }
/// }
/// ```
///
/// # Returns
/// - 201: Plan created at version 1
/// - 400: Invalid plan terms
pub async fn create_plan(
    tenant_id: web::Path<String>,
    request: web::Json<CreatePlanRequest>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;
    let request = request.into_inner();

    let plan = engine
        .plans
        .create_plan(&tenant, request.name, request.terms)
        .await?;

    Ok(HttpResponse::Created().json(plan))
}

/// GET /tenants/{tenant_id}/plans/{plan_id}
pub async fn get_plan(
    path: web::Path<(String, Uuid)>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant_id, plan_id) = path.into_inner();
    let tenant = TenantId::new(tenant_id)?;

    let plan = engine.plans.get_plan(&tenant, plan_id).await?;
    Ok(HttpResponse::Ok().json(plan))
}

/// PUT /tenants/{tenant_id}/plans/{plan_id}
///
/// Replaces the terms and bumps the version. Existing enrollments keep their snapshot.
pub async fn revise_plan(
    path: web::Path<(String, Uuid)>,
    request: web::Json<RevisePlanRequest>,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let (tenant_id, plan_id) = path.into_inner();
    let tenant = TenantId::new(tenant_id)?;

    let plan = engine
        .plans
        .revise_plan(&tenant, plan_id, request.into_inner().terms)
        .await?;
    Ok(HttpResponse::Ok().json(plan))
}

/// Configure plan routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tenants/{tenant_id}/plans").route(web::post().to(create_plan)))
        .service(
            web::resource("/tenants/{tenant_id}/plans/{plan_id}")
                .route(web::get().to(get_plan))
                .route(web::put().to(revise_plan)),
        );
}
