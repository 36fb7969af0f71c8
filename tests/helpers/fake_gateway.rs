use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use enrollpay::core::{AppError, Result};
use enrollpay::modules::gateways::{
    ChargeRequest, ChargeResponse, HttpGateway, PaymentGateway, RefundRequest, RefundResponse,
};

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// In-process gateway that records every call and hands out sequential references
#[derive(Default)]
pub struct RecordingGateway {
    charges: Mutex<Vec<ChargeRequest>>,
    refunds: Mutex<Vec<RefundRequest>>,
    next_ref: AtomicUsize,
    fail_charges: AtomicBool,
    fail_refunds: AtomicBool,
    hold_charges: AtomicBool,
    charge_started: Notify,
    charge_released: Notify,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_charges(&self, fail: bool) {
        self.fail_charges.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    /// Park each charge after the gateway has created it until `release_charge` is called
    pub fn hold_charges(&self, hold: bool) {
        self.hold_charges.store(hold, Ordering::SeqCst);
    }

    /// Wait until a held charge has been created
    pub async fn charge_started(&self) {
        self.charge_started.notified().await;
    }

    pub fn release_charge(&self) {
        self.charge_released.notify_one();
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.refunds.lock().unwrap().clone()
    }

    /// The reference the next charge or refund will receive
    pub fn peek_ref(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_ref.load(Ordering::SeqCst) + 1)
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_ref.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse> {
        if self.fail_charges.load(Ordering::SeqCst) {
            return Err(AppError::gateway("card network unavailable"));
        }
        self.charges.lock().unwrap().push(request);
        let charge_ref = self.next("ch");
        if self.hold_charges.load(Ordering::SeqCst) {
            self.charge_started.notify_one();
            self.charge_released.notified().await;
        }
        Ok(ChargeResponse { charge_ref })
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(AppError::gateway("refund rejected"));
        }
        self.refunds.lock().unwrap().push(request);
        Ok(RefundResponse {
            refund_ref: self.next("rf"),
        })
    }

    fn verify_webhook(&self, signature: &str, payload: &[u8]) -> bool {
        HttpGateway::sign(WEBHOOK_SECRET, payload)
            .map(|expected| expected == signature)
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
