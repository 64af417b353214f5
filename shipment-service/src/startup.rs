use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, patch, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;

use crate::config::{ShipmentConfig, StoreBackend};
use crate::handlers;
use crate::services::{
    CarrierApi, CarrierSync, EmpostClient, LifecycleService, MemoryStore, MongoStore,
    PaymentQrService, ResponseCache, ShipmentStore,
};
use crate::workers::RetentionSweeper;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ShipmentConfig>,
    pub store: Arc<dyn ShipmentStore>,
    pub lifecycle: Arc<LifecycleService>,
    pub cache: ResponseCache,
    pub sweeper: Arc<RetentionSweeper>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ShipmentConfig) -> Result<Self, AppError> {
        let store: Arc<dyn ShipmentStore> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store backend");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Mongo => {
                let uri = config.store.mongodb_uri.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "MONGODB_URI is required for the mongo store backend"
                    ))
                })?;

                let mut client_options = ClientOptions::parse(uri).await.map_err(|e| {
                    tracing::error!("Failed to parse MongoDB connection string: {}", e);
                    AppError::DatabaseError(e.into())
                })?;
                client_options.app_name = Some("shipment-service".to_string());

                let client = Client::with_options(client_options).map_err(|e| {
                    tracing::error!("Failed to create MongoDB client: {}", e);
                    AppError::DatabaseError(e.into())
                })?;
                let db = client.database(&config.store.mongodb_database);

                let store = MongoStore::new(&db);
                store.init_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    e
                })?;
                Arc::new(store)
            }
        };

        let carrier: Arc<dyn CarrierApi> = Arc::new(EmpostClient::new(
            config.carrier.clone(),
            config.finance.currency.clone(),
        ));
        if config.carrier.enabled {
            tracing::info!("EMPOST carrier sync enabled");
        } else {
            tracing::warn!("EMPOST carrier sync disabled - shipments stay local only");
        }

        Self::build_with_store(config, store, carrier).await
    }

    /// Assembly seam taking pre-built store and carrier instances; tests
    /// inject the memory store and a recording carrier double here.
    pub async fn build_with_store(
        config: ShipmentConfig,
        store: Arc<dyn ShipmentStore>,
        carrier: Arc<dyn CarrierApi>,
    ) -> Result<Self, AppError> {
        let sync = CarrierSync::new(
            carrier,
            store.clone(),
            Duration::from_secs(config.carrier.timeout_secs),
        );
        let qr = PaymentQrService::new(config.finance.payment_base_url.clone());
        let lifecycle = Arc::new(LifecycleService::new(
            store.clone(),
            sync,
            qr,
            config.finance.currency.clone(),
        ));
        let cache = ResponseCache::new(Duration::from_secs(config.cache.ttl_secs));
        let sweeper = Arc::new(RetentionSweeper::new(store.clone()));

        let state = AppState {
            config: Arc::new(config),
            store,
            lifecycle,
            cache,
            sweeper,
        };

        // Port 0 binds a random free port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state for sharing with tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped. Starts the retention sweeper
    /// loop alongside the HTTP server; a shutdown signal stops both.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let shutdown = CancellationToken::new();

        let sweeper = self.state.sweeper.clone();
        let period = Duration::from_secs(self.state.config.retention.interval_secs);
        let sweeper_task = tokio::spawn(sweeper.run_interval(period, shutdown.clone()));

        let router = build_router(self.state.clone());

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        shutdown.cancel();
        let _ = sweeper_task.await;

        result
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .route(
            "/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/bookings/:id/review",
            post(handlers::bookings::review_booking),
        )
        .route(
            "/invoice-requests",
            post(handlers::invoice_requests::create_draft)
                .get(handlers::invoice_requests::list_requests),
        )
        .route(
            "/invoice-requests/:id",
            get(handlers::invoice_requests::get_request),
        )
        .route(
            "/invoice-requests/:id/verification",
            post(handlers::invoice_requests::submit_verification),
        )
        .route(
            "/invoice-requests/:id/verification/complete",
            post(handlers::invoice_requests::complete_verification),
        )
        .route(
            "/invoice-requests/:id/finance-complete",
            post(handlers::invoice_requests::complete_finance),
        )
        .route(
            "/invoice-requests/:id/status",
            patch(handlers::invoice_requests::change_status),
        )
        .route(
            "/invoice-requests/:id/delivery-status",
            patch(handlers::invoice_requests::change_delivery_status),
        )
        .route("/admin/cleanup", post(handlers::admin::run_cleanup))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
