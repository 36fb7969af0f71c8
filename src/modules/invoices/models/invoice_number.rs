use serde::{Deserialize, Serialize};

use crate::core::{InvoiceNumberFormat, TenantId};

/// An allocated, formatted invoice number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumber {
    pub tenant_id: TenantId,
    /// Raw per-tenant counter value
    pub counter: i64,
    pub value: String,
}

impl InvoiceNumber {
    pub fn new(tenant_id: TenantId, format: &InvoiceNumberFormat, year: i32, counter: i64) -> Self {
        Self {
            tenant_id,
            counter,
            value: format.render(year, counter),
        }
    }
}

impl std::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
