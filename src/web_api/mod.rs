//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Refresh trigger, lock status and forced release
//! - Integration management and connection tests
//! - Operator push operations (layout, unit params, windows, routing)

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let refresh_running = state
        .refresh
        .status()
        .await
        .map(|s| s.is_running)
        .unwrap_or(false);

    Json(HealthResponse {
        status: if db_connected { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db_connected,
        refresh_running,
    })
}
