pub mod payment;

pub use payment::{Payment, PaymentMethod, PaymentStatus, RefundRecord, RefundSource};
