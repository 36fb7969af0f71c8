//! Settlement records: one per charge attempt or manual payment, plus their refunds

pub mod models;

pub use models::{Payment, PaymentMethod, PaymentStatus, RefundRecord, RefundSource};
