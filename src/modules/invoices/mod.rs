//! Invoice numbering and the issuance of gateway charges for due schedule entries

pub mod controllers;
pub mod models;
pub mod services;

pub use models::InvoiceNumber;
pub use services::{DueScanSummary, InvoiceIssuer, InvoiceNumberAllocator, IssueMode, IssuedInvoice};
