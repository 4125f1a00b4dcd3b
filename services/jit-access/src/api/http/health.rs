//! 健康检查与指标

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jit_adapter_postgres::check_connection;
use serde::Serialize;
use tracing::warn;

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub role_graph_version: u64,
    pub roles: usize,
    pub providers: Vec<String>,
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match &state.database {
        Some(pool) => match check_connection(pool).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Health check failed");
                false
            }
        },
        None => true,
    };
    let (code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let graph = state.roles.snapshot();
    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        role_graph_version: graph.version(),
        roles: graph.role_count(),
        providers: state.providers.ids(),
    };
    (code, Json(body))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
