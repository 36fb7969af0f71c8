pub mod payment_plan;

pub use payment_plan::{
    DepositRule, Frequency, PaymentPlan, PaymentType, PlanTerms, MAX_INSTALLMENTS,
};
