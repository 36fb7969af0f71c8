pub mod enrollments;
pub mod events;
pub mod gateways;
pub mod health;
pub mod invoices;
pub mod payments;
pub mod plans;
pub mod schedules;
pub mod settlements;

use actix_web::web;

use crate::core::{EngineContext, Result};
use invoices::{InvoiceIssuer, InvoiceNumberAllocator};
use plans::PlanCatalog;
use schedules::ScheduleManager;
use settlements::SettlementReconciler;

/// Every engine service, built over one shared context
///
/// Registered once as `web::Data` and shared by all HTTP handlers.
pub struct BillingEngine {
    pub plans: PlanCatalog,
    pub schedules: ScheduleManager,
    pub invoices: InvoiceIssuer,
    pub invoice_numbers: InvoiceNumberAllocator,
    pub settlements: SettlementReconciler,
    ctx: EngineContext,
}

impl BillingEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            plans: PlanCatalog::new(ctx.clone()),
            schedules: ScheduleManager::new(ctx.clone()),
            invoices: InvoiceIssuer::new(ctx.clone()),
            invoice_numbers: InvoiceNumberAllocator::new(ctx.clone()),
            settlements: SettlementReconciler::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Open and roll back a store transaction
    pub async fn ping(&self) -> Result<()> {
        let tx = self.ctx.store.begin().await?;
        drop(tx);
        Ok(())
    }
}

/// Register every HTTP route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::controllers::configure)
        .configure(plans::controllers::configure)
        .configure(schedules::controllers::configure)
        .configure(invoices::controllers::configure)
        .configure(settlements::controllers::configure);
}
