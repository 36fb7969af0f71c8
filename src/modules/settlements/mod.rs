//! Gateway settlement webhooks and the ledger that makes them idempotent

pub mod controllers;
pub mod models;
pub mod services;

pub use models::{WebhookEventRecord, WebhookEventStatus};
pub use services::{ReconcileOutcome, SettlementReconciler};
