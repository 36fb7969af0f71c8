pub mod settlement_reconciler;

pub use settlement_reconciler::{ReconcileOutcome, SettlementReconciler};
