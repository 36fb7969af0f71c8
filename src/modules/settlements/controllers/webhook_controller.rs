use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::info;

use crate::core::{AppError, Result, TenantId};
use crate::modules::gateways::SIGNATURE_HEADER;
use crate::modules::settlements::services::ReconcileOutcome;
use crate::modules::BillingEngine;

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub outcome: ReconcileOutcome,
}

/// Receive a gateway settlement webhook
///
/// POST /webhooks/{tenant_id}
///
/// The signature is checked against the raw body, so the payload is read as bytes rather
/// than as JSON.
///
/// # Headers
/// * `X-Gateway-Signature` - hex HMAC-SHA256 of the body
///
/// # Returns
/// * `200 OK` - Event recorded; `outcome` says whether it changed anything
/// * `400 Bad Request` - Payload is not a gateway event
/// * `401 Unauthorized` - Missing or invalid signature
/// * `500 Internal Server Error` - Event not recorded; the gateway should retry
pub async fn receive_webhook(
    req: HttpRequest,
    tenant_id: web::Path<String>,
    body: web::Bytes,
    engine: web::Data<BillingEngine>,
) -> Result<HttpResponse> {
    let tenant = TenantId::new(tenant_id.into_inner())?;
    let signature = extract_signature(&req)?;

    let outcome = engine
        .settlements
        .handle_webhook(&tenant, &signature, &body)
        .await?;

    info!(tenant_id = %tenant, outcome = ?outcome, "Webhook acknowledged");
    Ok(HttpResponse::Ok().json(WebhookResponse { outcome }))
}

fn extract_signature(req: &HttpRequest) -> Result<String> {
    req.headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {} header", SIGNATURE_HEADER)))
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhooks/{tenant_id}").route(web::post().to(receive_webhook)));
}
