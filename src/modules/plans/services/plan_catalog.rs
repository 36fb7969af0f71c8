use tracing::info;
use uuid::Uuid;

use crate::core::{AppError, EngineContext, Result, TenantId};
use crate::modules::plans::models::{PaymentPlan, PlanTerms};

/// Tenant-owned payment plan templates
///
/// Revisions bump the version; enrollments keep the snapshot they were created from.
pub struct PlanCatalog {
    ctx: EngineContext,
}

impl PlanCatalog {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn create_plan(
        &self,
        tenant: &TenantId,
        name: String,
        terms: PlanTerms,
    ) -> Result<PaymentPlan> {
        let plan = PaymentPlan::new(tenant.clone(), name, terms, self.ctx.clock.now())?;

        let mut tx = self.ctx.store.begin().await?;
        tx.insert_plan(&plan).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            plan_id = %plan.id,
            plan_type = plan.terms.plan_type(),
            "Payment plan created"
        );
        Ok(plan)
    }

    /// Replace a plan's terms; existing enrollments are unaffected
    pub async fn revise_plan(
        &self,
        tenant: &TenantId,
        plan_id: Uuid,
        terms: PlanTerms,
    ) -> Result<PaymentPlan> {
        let mut tx = self.ctx.store.begin().await?;
        let mut plan = tx
            .find_plan(tenant, plan_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Plan {}", plan_id)))?;

        plan.revise(terms, self.ctx.clock.now())?;
        tx.update_plan(&plan).await?;
        tx.commit().await?;

        info!(
            tenant_id = %tenant,
            plan_id = %plan.id,
            version = plan.version,
            "Payment plan revised"
        );
        Ok(plan)
    }

    pub async fn get_plan(&self, tenant: &TenantId, plan_id: Uuid) -> Result<PaymentPlan> {
        let mut tx = self.ctx.store.begin().await?;
        tx.find_plan(tenant, plan_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Plan {}", plan_id)))
    }
}
