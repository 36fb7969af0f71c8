use std::sync::Arc;

use crate::config::BillingSettings;
use crate::core::{Clock, TenantConfigService};
use crate::modules::events::EventPublisher;
use crate::modules::gateways::PaymentGateway;
use crate::modules::schedules::repositories::ScheduleStore;

/// Collaborators shared by every engine service
///
/// Cloning is cheap; each field is reference counted.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn ScheduleStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tenants: Arc<dyn TenantConfigService>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventPublisher>,
    pub settings: BillingSettings,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        gateway: Arc<dyn PaymentGateway>,
        tenants: Arc<dyn TenantConfigService>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            tenants,
            clock,
            events,
            settings,
        }
    }
}
