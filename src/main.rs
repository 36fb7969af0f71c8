use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrollpay::config::{Config, StaticTenantConfig};
use enrollpay::core::{EngineContext, SystemClock};
use enrollpay::middleware::{json_error_handler, path_error_handler, ErrorHandler, RequestId};
use enrollpay::modules::events::TracingEventPublisher;
use enrollpay::modules::gateways::HttpGateway;
use enrollpay::modules::schedules::MySqlScheduleStore;
use enrollpay::BillingEngine;

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "enrollpay=debug,actix_web=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    init_tracing(&config.app.log_format);

    tracing::info!("Starting Enrollpay billing engine");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    let db_pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;
    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.max_connections
    );

    if config.database.run_migrations {
        config
            .database
            .migrate(&db_pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database migrations applied");
    }

    let tenants = match &config.billing.tenant_config_path {
        Some(path) => StaticTenantConfig::load(&config.billing.default_invoice_prefix, path)
            .context("Failed to load tenant configuration")?,
        None => StaticTenantConfig::new(&config.billing.default_invoice_prefix),
    };
    let gateway = HttpGateway::new(&config.gateway).context("Failed to build gateway client")?;

    let ctx = EngineContext::new(
        Arc::new(MySqlScheduleStore::new(db_pool)),
        Arc::new(gateway),
        Arc::new(tenants),
        Arc::new(SystemClock),
        Arc::new(TracingEventPublisher),
        config.billing.clone(),
    );
    let engine = web::Data::new(BillingEngine::new(ctx));

    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(ErrorHandler)
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .app_data(engine.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::PathConfig::default().error_handler(path_error_handler))
            .configure(enrollpay::configure)
    })
    .workers(config.server.workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await?;
    Ok(())
}
