use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error};

use super::gateway_trait::{
    ChargeRequest, ChargeResponse, PaymentGateway, RefundRequest, RefundResponse,
};
use crate::config::GatewayConfig;
use crate::core::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw webhook body
pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

/// REST client for the card gateway
///
/// Transient failures (connect errors, 5xx, 429) are retried with exponential backoff. Every
/// request carries an `Idempotency-Key` so a retried POST never creates a second charge.
pub struct HttpGateway {
    client: ClientWithMiddleware,
    api_key: String,
    webhook_secret: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    amount: String,
    currency: &'a str,
    customer: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    charge: &'a str,
    amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct IdResponse {
    id: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize>(&self, path: &str, idempotency_key: &str, body: &B) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, idempotency_key, "Calling gateway");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(url = %url, status = %status, body = %body, "Gateway rejected request");
            return Err(AppError::gateway(describe_failure(status, &body)));
        }

        let parsed: IdResponse = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to parse gateway response: {}", e)))?;
        Ok(parsed.id)
    }

    /// Hex HMAC-SHA256 of `payload` under `secret`
    pub fn sign(secret: &str, payload: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Configuration(format!("Invalid webhook secret: {}", e)))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    if body.is_empty() {
        format!("Gateway returned {}", status)
    } else {
        format!("Gateway returned {}: {}", status, body)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse> {
        let body = ChargeBody {
            amount: request.amount.to_string(),
            currency: request.currency.as_str(),
            customer: &request.customer_ref,
            description: &request.description,
        };
        let charge_ref = self
            .post("/v1/charges", &request.idempotency_key, &body)
            .await?;
        Ok(ChargeResponse { charge_ref })
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        let body = RefundBody {
            charge: &request.charge_ref,
            amount: request.amount.to_string(),
            reason: request.reason.as_deref(),
        };
        let refund_ref = self
            .post("/v1/refunds", &request.idempotency_key, &body)
            .await?;
        Ok(RefundResponse { refund_ref })
    }

    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    fn name(&self) -> &str {
        "http"
    }
}
