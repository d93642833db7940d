//! HTTP API for health checks and submission status

use crate::chain::{ChainClient, ChainProvider};
use crate::config::ApiConfig;
use crate::error::{SubmitterError, SubmitterResult};
use crate::scheduler::{CycleStatus, StatusBoard};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusBoard,
    pub provider: Arc<ChainProvider>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(status: StatusBoard, provider: Arc<ChainProvider>) -> Self {
        Self {
            status,
            provider,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> SubmitterResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SubmitterError::Internal(format!("api bind {}: {}", addr, e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| SubmitterError::Internal(format!("api server: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the RPC endpoint answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let chain_id = state.provider.chain_id();
    let healthy = state.provider.health_check().await;
    crate::metrics::record_chain_health(chain_id, healthy);

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadinessResponse {
            ready: healthy,
            chain_id,
        }),
    )
}

/// Cycle counters and the latest outcome
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let cycles = state.status.read().await.clone();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain_id: state.provider.chain_id(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cycles,
    })
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    chain_id: u64,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    chain_id: u64,
    uptime_seconds: u64,
    #[serde(flatten)]
    cycles: CycleStatus,
}
