use service_core::observability::init_tracing;
use shipment_service::config::ShipmentConfig;
use shipment_service::services::init_metrics;
use shipment_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Metrics recorder must be installed before anything records.
    init_metrics();

    let config = ShipmentConfig::load()
        .map_err(|e| std::io::Error::other(format!("Configuration error: {}", e)))?;

    init_tracing(
        "shipment-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
