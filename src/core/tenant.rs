use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{AppError, Currency, Result};

/// Tenant identifier carried explicitly through every engine call and query predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Tenant id cannot be empty"));
        }
        if trimmed.len() > 64 {
            return Err(AppError::validation("Tenant id cannot exceed 64 characters"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a tenant's invoice numbers are rendered: `{prefix}-{year}-{counter}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumberFormat {
    pub prefix: String,
    /// Zero-padding width of the counter
    #[serde(default = "default_counter_width")]
    pub counter_width: usize,
    #[serde(default = "default_include_year")]
    pub include_year: bool,
}

fn default_counter_width() -> usize {
    6
}

fn default_include_year() -> bool {
    true
}

impl InvoiceNumberFormat {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter_width: default_counter_width(),
            include_year: default_include_year(),
        }
    }

    pub fn render(&self, year: i32, counter: i64) -> String {
        if self.include_year {
            format!(
                "{}-{}-{:0width$}",
                self.prefix,
                year,
                counter,
                width = self.counter_width
            )
        } else {
            format!("{}-{:0width$}", self.prefix, counter, width = self.counter_width)
        }
    }
}

/// Tenant/currency configuration collaborator
pub trait TenantConfigService: Send + Sync {
    /// Decimal precision for amounts in `currency` for this tenant
    fn currency_scale(&self, tenant: &TenantId, currency: &Currency) -> u32;

    /// Invoice number rendering for this tenant
    fn invoice_format(&self, tenant: &TenantId) -> InvoiceNumberFormat;
}
