use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;

pub mod billing;
pub mod database;
pub mod server;
pub mod tenants;

pub use billing::BillingSettings;
pub use database::DatabaseConfig;
pub use server::ServerConfig;
pub use tenants::StaticTenantConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// `json` or `pretty`
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            gateway: GatewayConfig {
                api_key: env::var("GATEWAY_API_KEY")
                    .map_err(|_| AppError::Configuration("GATEWAY_API_KEY not set".to_string()))?,
                webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET").map_err(|_| {
                    AppError::Configuration("GATEWAY_WEBHOOK_SECRET not set".to_string())
                })?,
                base_url: env::var("GATEWAY_BASE_URL")
                    .map_err(|_| AppError::Configuration("GATEWAY_BASE_URL not set".to_string()))?,
                timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", 15)?,
                max_retries: parse_var("GATEWAY_MAX_RETRIES", 2)?,
            },
            billing: BillingSettings::from_env()?,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Gateway timeout must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.app.log_format.as_str(), "json" | "pretty") {
            return Err(AppError::Configuration(format!(
                "LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                self.app.log_format
            )));
        }

        self.billing.validate()
    }
}

/// Reads an env var, falling back to `default` when unset
pub(crate) fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid {}", name))),
        Err(_) => Ok(default),
    }
}
