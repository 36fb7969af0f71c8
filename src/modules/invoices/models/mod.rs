pub mod invoice_number;

pub use invoice_number::InvoiceNumber;
