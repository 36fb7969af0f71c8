pub mod plan_calculator;
pub mod plan_catalog;

pub use plan_calculator::{InstallmentSpec, PlanCalculator};
pub use plan_catalog::PlanCatalog;
