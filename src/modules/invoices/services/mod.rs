pub mod invoice_issuer;
pub mod invoice_number_allocator;

pub use invoice_issuer::{DueScanSummary, InvoiceIssuer, IssueMode, IssuedInvoice};
pub use invoice_number_allocator::InvoiceNumberAllocator;
