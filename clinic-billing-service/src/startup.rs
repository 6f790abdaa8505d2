//! Application startup and lifecycle management.

use crate::billing::{BillingEngine, DayBoundary};
use crate::config::BillingConfig;
use crate::handlers;
use crate::services::{init_metrics, BillingStore, Database};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use service_core::observability::trace_context_middleware;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub engine: Arc<BillingEngine>,
}

impl AppState {
    /// Wire the engine over any store.
    pub fn new(config: BillingConfig, store: Arc<dyn BillingStore>) -> Result<Self, AppError> {
        let day_boundary = DayBoundary::from_offset_minutes(config.analytics.utc_offset_minutes)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?;
        let engine = BillingEngine::new(store, day_boundary, config.archive.statement_timeout);

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}

/// HTTP routes with the standard middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bills", post(handlers::create_bill))
        .route("/bills/unsettled", get(handlers::list_unsettled))
        .route(
            "/bills/:bill_id",
            get(handlers::get_bill).patch(handlers::update_bill),
        )
        .route(
            "/bills/:bill_id/payments",
            get(handlers::list_payments).post(handlers::record_payment),
        )
        .route("/bills/:bill_id/audit", get(handlers::get_audit_trail))
        .route("/bills/:bill_id/archive", post(handlers::archive_bill))
        .route("/analytics/daily", get(handlers::daily_analytics))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BillingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: BillingConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        Self::with_store(config, Arc::new(db)).await
    }

    /// Build over an already constructed store.
    pub async fn with_store(
        config: BillingConfig,
        store: Arc<dyn BillingStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState::new(config.clone(), store)?;

        let addr = config.common.bind_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Clinic billing listener bound");

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

    pub fn engine(&self) -> &BillingEngine {
        &self.state.engine
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
    }
}
