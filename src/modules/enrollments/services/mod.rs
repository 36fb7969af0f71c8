pub mod aggregates;

pub use aggregates::{recompute, refresh_totals, TotalsChange};
