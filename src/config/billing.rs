use serde::Deserialize;
use std::env;

use super::parse_var;
use crate::core::{AppError, Result};

/// Engine tuning knobs
#[derive(Debug, Clone, Deserialize)]
pub struct BillingSettings {
    /// Failed charge attempts after which an entry is surfaced as `failed`
    pub max_charge_attempts: i32,
    /// Subscription periods materialised at enrollment time
    pub subscription_periods_ahead: i32,
    /// Upper bound on entries fetched per due / overdue scan
    pub due_scan_batch_size: i64,
    pub default_invoice_prefix: String,
    /// Optional YAML file with per-tenant overrides
    pub tenant_config_path: Option<String>,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            max_charge_attempts: 3,
            subscription_periods_ahead: 3,
            due_scan_batch_size: 500,
            default_invoice_prefix: "INV".to_string(),
            tenant_config_path: None,
        }
    }
}

impl BillingSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_charge_attempts: parse_var("MAX_CHARGE_ATTEMPTS", defaults.max_charge_attempts)?,
            subscription_periods_ahead: parse_var(
                "SUBSCRIPTION_PERIODS_AHEAD",
                defaults.subscription_periods_ahead,
            )?,
            due_scan_batch_size: parse_var("DUE_SCAN_BATCH_SIZE", defaults.due_scan_batch_size)?,
            default_invoice_prefix: env::var("DEFAULT_INVOICE_PREFIX")
                .unwrap_or(defaults.default_invoice_prefix),
            tenant_config_path: env::var("TENANT_CONFIG_PATH").ok(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_charge_attempts < 1 {
            return Err(AppError::Configuration(
                "MAX_CHARGE_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.subscription_periods_ahead < 1 {
            return Err(AppError::Configuration(
                "SUBSCRIPTION_PERIODS_AHEAD must be at least 1".to_string(),
            ));
        }
        if self.due_scan_batch_size < 1 {
            return Err(AppError::Configuration(
                "DUE_SCAN_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.default_invoice_prefix.trim().is_empty() {
            return Err(AppError::Configuration(
                "DEFAULT_INVOICE_PREFIX cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
