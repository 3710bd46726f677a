//! Billing Engine entry point: applies migrations and verifies connectivity.

use billing_engine::config::EngineConfig;
use billing_engine::startup::BillingEngine;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Initialize tracing
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.common.environment,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        "Starting billing-engine"
    );

    let engine = BillingEngine::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build billing engine");
        std::io::Error::other(format!("Engine build error: {}", e))
    })?;

    engine.database().health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        std::io::Error::other(format!("Health check error: {}", e))
    })?;

    tracing::info!("Billing engine ready");
    Ok(())
}
