//! Payment plan templates and the arithmetic that turns a plan into installments

pub mod controllers;
pub mod models;
pub mod services;

pub use models::{DepositRule, Frequency, PaymentPlan, PaymentType, PlanTerms};
pub use services::{InstallmentSpec, PlanCalculator, PlanCatalog};
