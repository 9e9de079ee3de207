//! Multiviewer / Router Control Server
//!
//! Main entry point.

use mvcontrol::{
    integration::{IntegrationRepository, IntegrationService},
    mv_control::MvControlService,
    mv_state::{StateRepository, StateStore},
    refresh_orchestrator::RefreshOrchestrator,
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvcontrol=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mvcontrol v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        refresh_cooldown_secs = config.refresh_cooldown_secs,
        refresh_stale_lock_secs = ?config.refresh_stale_lock_secs,
        quartz_workers = config.quartz_workers,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied");

    // Initialize components
    let store: Arc<dyn StateStore> = Arc::new(StateRepository::new(pool.clone()));
    let integrations = Arc::new(IntegrationService::new(
        IntegrationRepository::new(pool.clone()),
        config.client_timeouts(),
    ));
    let refresh = Arc::new(RefreshOrchestrator::new(
        store.clone(),
        integrations.clone(),
        config.refresh_settings(),
    ));
    let control = Arc::new(MvControlService::new(store.clone(), integrations.clone()));

    // A lock left running by a previous process is only cleared by an
    // explicit release (or stale takeover when configured)
    let status = store.load_refresh_status().await?;
    if status.is_running {
        tracing::warn!(
            started_by = ?status.started_by,
            started_at = ?status.started_at,
            "Refresh lock is held from a previous run; POST /api/refresh/release to clear it"
        );
    }

    let state = AppState {
        pool,
        config: config.clone(),
        store,
        integrations,
        refresh,
        control,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = web_api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
