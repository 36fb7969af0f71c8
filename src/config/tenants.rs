use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::core::{AppError, Currency, InvoiceNumberFormat, Result, TenantConfigService, TenantId};

/// Per-tenant overrides as written in the tenant YAML file
///
/// ```yaml
/// tenants:
///   acme:
///     invoice_prefix: ACME
///     counter_width: 5
///     currency_scales:
///       KWD: 3
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantOverrides {
    pub invoice_prefix: Option<String>,
    pub counter_width: Option<usize>,
    pub include_year: Option<bool>,
    #[serde(default)]
    pub currency_scales: HashMap<String, u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TenantFile {
    #[serde(default)]
    tenants: HashMap<String, TenantOverrides>,
}

/// Tenant configuration resolved from defaults plus an optional YAML file
#[derive(Debug, Clone)]
pub struct StaticTenantConfig {
    default_format: InvoiceNumberFormat,
    tenants: HashMap<TenantId, TenantOverrides>,
}

impl StaticTenantConfig {
    pub fn new(default_prefix: impl Into<String>) -> Self {
        Self {
            default_format: InvoiceNumberFormat::with_prefix(default_prefix),
            tenants: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant: TenantId, overrides: TenantOverrides) -> Self {
        self.tenants.insert(tenant, overrides);
        self
    }

    /// Parse overrides from YAML text
    pub fn from_yaml(default_prefix: impl Into<String>, yaml: &str) -> Result<Self> {
        let file: TenantFile = serde_yaml::from_str(yaml)
            .map_err(|e| AppError::Configuration(format!("Invalid tenant config: {}", e)))?;

        let mut config = Self::new(default_prefix);
        for (tenant, overrides) in file.tenants {
            if let Some(width) = overrides.counter_width {
                if width == 0 || width > 12 {
                    return Err(AppError::Configuration(format!(
                        "Tenant '{}' counter_width must be between 1 and 12",
                        tenant
                    )));
                }
            }
            config = config.with_tenant(TenantId::new(tenant)?, overrides);
        }
        Ok(config)
    }

    /// Load overrides from a YAML file on disk
    pub fn load(default_prefix: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read tenant config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(default_prefix, &yaml)
    }
}

impl TenantConfigService for StaticTenantConfig {
    fn currency_scale(&self, tenant: &TenantId, currency: &Currency) -> u32 {
        self.tenants
            .get(tenant)
            .and_then(|o| o.currency_scales.get(currency.as_str()).copied())
            .unwrap_or_else(|| currency.default_scale())
    }

    fn invoice_format(&self, tenant: &TenantId) -> InvoiceNumberFormat {
        let mut format = self.default_format.clone();
        if let Some(overrides) = self.tenants.get(tenant) {
            if let Some(prefix) = &overrides.invoice_prefix {
                format.prefix = prefix.clone();
            }
            if let Some(width) = overrides.counter_width {
                format.counter_width = width;
            }
            if let Some(include_year) = overrides.include_year {
                format.include_year = include_year;
            }
        }
        format
    }
}
