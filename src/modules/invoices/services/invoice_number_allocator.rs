use chrono::Datelike;
use tracing::debug;

use crate::core::{EngineContext, Result, TenantId};
use crate::modules::invoices::models::InvoiceNumber;
use crate::modules::schedules::repositories::ScheduleTx;

/// Gap-free, tenant-scoped invoice numbers
///
/// The counter increment is a single atomic statement on the tenant's counter row. Allocating
/// inside a caller's transaction ties the number to that transaction: if it rolls back, the
/// increment does too and the number is handed out again.
#[derive(Clone)]
pub struct InvoiceNumberAllocator {
    ctx: EngineContext,
}

impl InvoiceNumberAllocator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Allocate within an open transaction
    pub async fn allocate_in(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant: &TenantId,
    ) -> Result<InvoiceNumber> {
        let counter = tx.next_invoice_counter(tenant).await?;
        let format = self.ctx.tenants.invoice_format(tenant);
        let number = InvoiceNumber::new(
            tenant.clone(),
            &format,
            self.ctx.clock.now().year(),
            counter,
        );

        debug!(tenant_id = %tenant, invoice_number = %number, "Allocated invoice number");
        Ok(number)
    }

    /// Allocate and commit immediately
    pub async fn allocate(&self, tenant: &TenantId) -> Result<InvoiceNumber> {
        let mut tx = self.ctx.store.begin().await?;
        let number = self.allocate_in(tx.as_mut(), tenant).await?;
        tx.commit().await?;
        Ok(number)
    }
}
