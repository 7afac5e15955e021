//! Rendezvous API Server
//!
//! Hosts the message service and the temperature monitor, and exposes both
//! over a small REST API.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod preferences;
pub mod rate_limit;
mod routes;

use crate::config::{AppConfig, LoggingConfig};
use crate::preferences::Preferences;
use crate::rate_limit::RateLimitConfig;
use alerting::{AlertSink, HistorySink, MonitorError, MonitorState, TemperatureMonitor};
use storage::{MessageService, MessageStore, SharedStore, StoreError};

/// Shared handle passed to every route
pub type SharedState = Arc<RwLock<AppState>>;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(StoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::ServiceStopped | StoreError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Store(StoreError::DatabaseError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Monitor(MonitorError::SensorUnavailable(_)) => StatusCode::CONFLICT,
            ApiError::Monitor(MonitorError::AlreadyRunning(_)) => StatusCode::CONFLICT,
            ApiError::Monitor(MonitorError::InvalidConfig(_) | MonitorError::TaskFailed(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Serialized message writes and live snapshots
    pub messages: MessageService,
    /// Ambient temperature monitor
    pub monitor: TemperatureMonitor,
    /// Alerts delivered by the monitor, gated by notification permission
    pub alerts: Arc<HistorySink>,
    pub preferences: Preferences,
    pub config: AppConfig,
    /// Prometheus exporter, when a recorder was installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Open the configured store and build the state around it
    pub async fn open(config: AppConfig, shared: &SharedStore) -> Result<Self, ApiError> {
        let store = shared.get_or_open().await?;
        Ok(Self::with_store(config, store))
    }

    /// Build state around an already opened store
    pub fn with_store(config: AppConfig, store: Arc<MessageStore>) -> Self {
        let messages = MessageService::spawn(store, config.store.queue_depth);
        let alerts = Arc::new(HistorySink::new(
            config.monitor.history_limit,
            config.preferences.notifications_allowed,
        ));
        let monitor = TemperatureMonitor::new(
            config.monitor.clone(),
            Arc::clone(&alerts) as Arc<dyn AlertSink>,
        );

        Self {
            messages,
            monitor,
            alerts,
            preferences: config.preferences.clone(),
            config,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Bring the monitor and alert sink in line with the preferences.
    ///
    /// When the sensor is unavailable, monitoring is switched back off in
    /// the preferences and the error is returned.
    pub async fn apply_preferences(&mut self) -> Result<(), ApiError> {
        self.alerts.set_permitted(self.preferences.notifications_allowed);

        let running = self.monitor.is_running();
        if self.preferences.monitoring_enabled && !running {
            let sampler = self.config.sensor.build_sampler(&self.config.monitor);
            if let Err(e) = self.monitor.start(sampler).await {
                self.preferences.monitoring_enabled = false;
                return Err(e.into());
            }
        } else if !self.preferences.monitoring_enabled && running {
            self.monitor.stop().await?;
        }

        let running = if self.monitor.is_running() { 1.0 } else { 0.0 };
        metrics::gauge!("rendezvous_monitor_running").set(running);
        Ok(())
    }

    /// Current monitor state
    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// Stop the monitor, drain queued writes and close the store
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.monitor.stop().await {
            warn!("Monitor did not stop cleanly: {}", e);
        }
        self.messages.shutdown().await;
        self.messages.store().close().await;
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub database: String,
    pub message_service: String,
    pub monitor: MonitorState,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub message_count: usize,
    pub subscribers: usize,
    pub alerts_sent: u64,
    pub alerts_missed: u64,
}

/// Create the application router.
///
/// With `rate_limit` set, message writes are throttled per peer IP.
pub fn create_router(state: SharedState, rate_limit: Option<&RateLimitConfig>) -> Router {
    let mut add = post(routes::messages::add_message);
    let mut remove = delete(routes::messages::delete_message);

    if let Some(config) = rate_limit {
        match rate_limit::write_governor(config) {
            Some(governor) => {
                add = add.layer(GovernorLayer {
                    config: Arc::clone(&governor),
                });
                remove = remove.layer(GovernorLayer { config: governor });
            }
            None => warn!("Invalid rate limit {:?}; message writes are not throttled", config),
        }
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/messages",
            get(routes::messages::list_messages).merge(add),
        )
        .route("/api/v1/messages/:id", remove)
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route(
            "/api/v1/profile",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/api/v1/monitor", get(routes::monitor::get_status))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let store = state.messages.store();
    let database = if store.is_closed() {
        "closed"
    } else if store.is_stale() {
        "stale"
    } else {
        "ok"
    };
    let database_ok = database == "ok";
    let service_ok = state.messages.is_running();

    let response = HealthResponse {
        status: (if database_ok && service_ok { "healthy" } else { "degraded" }).to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            database: database.to_string(),
            message_service: (if service_ok { "ok" } else { "stopped" }).to_string(),
            monitor: state.monitor_state(),
        },
        metrics: SystemMetrics {
            message_count: state.messages.snapshot().len(),
            subscribers: store.live().subscriber_count(),
            alerts_sent: state.monitor.alerts_sent(),
            alerts_missed: state.monitor.alerts_missed(),
        },
    };

    Json(response)
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Initialize logging. Later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    let installed = if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if !installed {
        warn!("Tracing subscriber already installed");
    }
}

/// Run the server until Ctrl-C, then shut everything down in order
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let shared = SharedStore::new(config.store.store_config());
    let mut state = AppState::open(config.clone(), &shared).await?;

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state.metrics = Some(handle),
        Err(e) => warn!("Prometheus recorder not installed: {}", e),
    }

    if let Err(e) = state.apply_preferences().await {
        warn!("Temperature monitoring not started: {}", e);
    }

    let state = Arc::new(RwLock::new(state));
    let rate_limit = config
        .server
        .rate_limit_enabled
        .then_some(&config.server.rate_limit);
    let app = create_router(Arc::clone(&state), rate_limit);

    info!("Starting API server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
    })
    .await?;

    state.write().await.shutdown().await;
    info!("Server stopped");
    Ok(())
}
