//! API Routes

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::integration::{IntegrationUpsert, Protocol};
use crate::models::ApiResponse;
use crate::mv_control::{field_options, MvParamsUpdate, WindowUpdate};
use crate::mv_state::{Multiviewer, MvSettings, WindowState};
use crate::nexx_client::varid::MAX_WINDOWS_PER_MV;
use crate::refresh_orchestrator::{RefreshRequest, RefreshScope};
use crate::state::AppState;
use crate::Error;

/// Header naming the operator who triggered a request
const OPERATOR_HEADER: &str = "x-operator";
const DEFAULT_OPERATOR: &str = "api";

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Refresh
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/refresh/status", get(refresh_status))
        .route("/api/refresh/release", post(release_refresh))
        // Integrations
        .route("/api/integrations", get(list_integrations).put(save_integration))
        .route("/api/integrations/:protocol", delete(delete_integration))
        .route("/api/integrations/:protocol/test", get(test_integration))
        // Multiviewers
        .route("/api/multiviewers", get(list_multiviewers))
        .route("/api/multiviewers/options", get(list_field_options))
        .route("/api/multiviewers/:index", get(get_multiviewer))
        .route("/api/multiviewers/:index/layout", post(set_layout))
        .route("/api/multiviewers/:index/params", post(set_mv_params))
        .route("/api/multiviewers/:index/windows/:window", post(set_window))
        // Routing
        .route("/api/routing/switch", post(switch_route))
        .route("/api/routing/:output", get(get_route))
        .with_state(state)
}

fn operator(headers: &HeaderMap) -> String {
    headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_OPERATOR)
        .to_string()
}

// ========================================
// Refresh Handlers
// ========================================

async fn trigger_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    scope: Option<Json<RefreshScope>>,
) -> impl IntoResponse {
    let mut request = RefreshRequest::new(operator(&headers));
    if let Some(Json(scope)) = scope {
        request = request.with_scope(scope);
    }

    match state.refresh.refresh(request).await {
        Ok(result) => Json(ApiResponse::success(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn refresh_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.refresh.status().await {
        Ok(status) => Json(ApiResponse::success(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn release_refresh(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match state.refresh.force_release(&operator(&headers)).await {
        Ok(status) => Json(ApiResponse::success(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Integration Handlers
// ========================================

async fn list_integrations(State(state): State<AppState>) -> impl IntoResponse {
    match state.integrations.repository().list().await {
        Ok(integrations) => Json(ApiResponse::success(integrations)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn save_integration(
    State(state): State<AppState>,
    Json(req): Json<IntegrationUpsert>,
) -> impl IntoResponse {
    if req.host.trim().is_empty() {
        return Error::Validation("host is required".to_string()).into_response();
    }

    match state.integrations.save(&req).await {
        Ok((integration, connection)) => Json(ApiResponse::success(serde_json::json!({
            "integration": integration,
            "connection": connection,
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_integration(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
) -> impl IntoResponse {
    let protocol: Protocol = match protocol.parse() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match state.integrations.remove(protocol).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn test_integration(
    State(state): State<AppState>,
    Path(protocol): Path<String>,
) -> impl IntoResponse {
    let protocol: Protocol = match protocol.parse() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match state.integrations.test_connection(protocol).await {
        Ok(result) => Json(ApiResponse::success(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Multiviewer Handlers
// ========================================

async fn list_multiviewers(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_multiviewers().await {
        Ok(units) => Json(ApiResponse::success(units)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Value/label choices for the enumerated unit fields
async fn list_field_options() -> impl IntoResponse {
    Json(ApiResponse::success(field_options()))
}

#[derive(Debug, Serialize)]
struct MultiviewerView {
    multiviewer: Multiviewer,
    settings: Option<MvSettings>,
    windows: Vec<WindowState>,
}

async fn get_multiviewer(
    State(state): State<AppState>,
    Path(index): Path<u32>,
) -> impl IntoResponse {
    let view = async {
        let multiviewer = state
            .store
            .get_multiviewer_by_index(index)
            .await?
            .ok_or_else(|| Error::NotFound(format!("MV {}", index)))?;
        let settings = state.store.get_mv_settings(multiviewer.id).await?;
        let mut windows = Vec::new();
        for window in 0..MAX_WINDOWS_PER_MV {
            if let Some(w) = state.store.get_window_state(multiviewer.id, window).await? {
                windows.push(w);
            }
        }
        Ok::<_, Error>(MultiviewerView {
            multiviewer,
            settings,
            windows,
        })
    }
    .await;

    match view {
        Ok(view) => Json(ApiResponse::success(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LayoutRequest {
    layout: i64,
}

async fn set_layout(
    State(state): State<AppState>,
    Path(index): Path<u32>,
    Json(req): Json<LayoutRequest>,
) -> impl IntoResponse {
    match state.control.set_layout(index, req.layout).await {
        Ok(()) => {
            Json(ApiResponse::success(serde_json::json!({ "layout": req.layout }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn set_mv_params(
    State(state): State<AppState>,
    Path(index): Path<u32>,
    Json(req): Json<MvParamsUpdate>,
) -> impl IntoResponse {
    match state.control.set_mv_params(index, &req).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn set_window(
    State(state): State<AppState>,
    Path((index, window)): Path<(u32, u32)>,
    Json(req): Json<WindowUpdate>,
) -> impl IntoResponse {
    match state.control.set_window(index, window, &req).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Routing Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    output: u32,
    input: u32,
}

async fn switch_route(
    State(state): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> impl IntoResponse {
    match state.control.switch_route(req.output, req.input).await {
        Ok(entry) => Json(ApiResponse::success(entry)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_route(State(state): State<AppState>, Path(output): Path<u32>) -> impl IntoResponse {
    match state.store.get_routing(output).await {
        Ok(Some(entry)) => Json(ApiResponse::success(entry)).into_response(),
        Ok(None) => Error::NotFound(format!("Routing for output {}", output)).into_response(),
        Err(e) => e.into_response(),
    }
}
