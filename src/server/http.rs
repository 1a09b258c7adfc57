//! HTTP routes

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::ivr::{CallRecord, CallRegistry};

/// State shared by the HTTP handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<CallRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<CallRegistry>) -> Self {
        Self {
            registry,
            started_at: Instant::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_calls: usize,
    pub total_calls: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/calls", get(calls_handler))
        .route("/calls/{id}", get(call_handler))
        .fallback(not_found)
        .with_state(state)
}

/// CORS policy; an empty origin list allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let summary = state.registry.summary().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_calls: summary.active,
        total_calls: summary.total,
    })
}

async fn calls_handler(State(state): State<AppState>) -> Json<Vec<CallRecord>> {
    Json(state.registry.list_all().await)
}

async fn call_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Some(call) => Json(call).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "call not found" })),
        )
            .into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}
