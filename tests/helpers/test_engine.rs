use std::sync::Arc;

use actix_web::web;
use enrollpay::config::{BillingSettings, StaticTenantConfig};
use enrollpay::core::{EngineContext, FixedClock, TenantId};
use enrollpay::modules::events::{BroadcastEventPublisher, DomainEvent};
use enrollpay::modules::gateways::GatewayEvent;
use enrollpay::modules::invoices::IssueMode;
use enrollpay::modules::schedules::{InMemoryScheduleStore, ScheduleStore, ScheduleTx};
use enrollpay::modules::settlements::{ReconcileOutcome, WebhookEventRecord, WebhookEventStatus};
use enrollpay::BillingEngine;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::fake_gateway::RecordingGateway;
use super::fixtures::{at, succeeded};

/// Engine wired to in-memory collaborators, starting on 2025-01-10
pub struct TestEngine {
    /// Shared the way the HTTP server shares it, so contract tests can mount it directly
    pub engine: web::Data<BillingEngine>,
    pub store: Arc<InMemoryScheduleStore>,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<FixedClock>,
    pub events: Arc<BroadcastEventPublisher>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_settings(BillingSettings::default())
    }

    pub fn with_settings(settings: BillingSettings) -> Self {
        Self::with_tenants(settings, StaticTenantConfig::new("INV"))
    }

    pub fn with_tenants(settings: BillingSettings, tenants: StaticTenantConfig) -> Self {
        let store = Arc::new(InMemoryScheduleStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(FixedClock::new(at(2025, 1, 10)));
        let events = Arc::new(BroadcastEventPublisher::new(256));

        let ctx = EngineContext::new(
            store.clone(),
            gateway.clone(),
            Arc::new(tenants),
            clock.clone(),
            events.clone(),
            settings,
        );

        Self {
            engine: web::Data::new(BillingEngine::new(ctx)),
            store,
            gateway,
            clock,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Ledger status of a webhook event, without changing the ledger
    pub async fn ledger(&self, tenant: &TenantId, event: &GatewayEvent) -> WebhookEventRecord {
        let mut tx = self.store.begin().await.unwrap();
        let lookup = WebhookEventRecord::received(tenant.clone(), event.clone(), at(2025, 1, 1));
        // Rolled back on drop, so an unknown event is not recorded.
        tx.claim_webhook_event(&lookup).await.unwrap()
    }

    pub async fn ledger_status(&self, tenant: &TenantId, event: &GatewayEvent) -> WebhookEventStatus {
        self.ledger(tenant, event).await.status
    }

    /// Charge an entry now and settle the charge; returns the charge reference
    pub async fn charge_and_settle(&self, tenant: &TenantId, entry_id: Uuid) -> String {
        let issued = self
            .engine
            .invoices
            .issue(tenant, entry_id, IssueMode::ChargeNow)
            .await
            .unwrap();
        let charge_ref = issued.payment.external_charge_id.clone().unwrap();

        let outcome = self
            .engine
            .settlements
            .apply_gateway_event(
                tenant,
                succeeded(&format!("evt_paid_{}", charge_ref), &charge_ref, issued.payment.amount),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);

        charge_ref
    }
}

/// Everything published since the last drain
pub fn drain(rx: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_names(events: &[DomainEvent]) -> Vec<&'static str> {
    events.iter().map(DomainEvent::name).collect()
}
