//! Enrollpay billing engine library
//!
//! Turns a product price and a payment plan into a dated schedule of installments, charges
//! due installments through a payment gateway, and reconciles the gateway's settlement
//! webhooks back onto schedules and enrollment totals. Every record belongs to a tenant.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::invoices;
pub use modules::plans;
pub use modules::schedules;
pub use modules::settlements;
pub use modules::{configure, BillingEngine};
