//! Enrollment aggregate: plan snapshot, invoice number and cached payment totals

pub mod models;
pub mod services;

pub use models::{Enrollment, EnrollmentStatus};
