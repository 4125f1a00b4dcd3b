//! 目录同步路由

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jit_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::application::catalog::StartSession;
use crate::domain::catalog::SessionId;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/catalog/sessions", post(start_session))
        .route("/api/catalog/sessions/{id}/chunks", post(push_chunk))
        .route("/api/catalog/sessions/{id}/commit", post(commit))
        .route("/api/catalog/sessions/{id}/abort", post(abort))
        .route("/api/catalog/pull", post(pull))
}

#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    pub provider: String,
    #[serde(default)]
    pub dataset: Option<String>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PushChunkBody {
    pub sequence: u64,
    /// base64 编码的分块内容
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct PushChunkResponse {
    pub accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommitBody {
    pub checksum: String,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub installed_version: String,
}

#[derive(Debug, Deserialize)]
pub struct AbortBody {
    #[serde(default)]
    pub reason: Option<String>,
}

fn parse_session_id(raw: &str) -> AppResult<SessionId> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("invalid session id: {}", raw)))
}

async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> AppResult<(StatusCode, Json<StartSessionResponse>)> {
    let mut request = StartSession::new(body.provider, body.version);
    if let Some(dataset) = body.dataset {
        request = request.with_dataset(dataset);
    }
    let id = state.synchronizer.start(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: id.to_string(),
        }),
    ))
}

async fn push_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PushChunkBody>,
) -> AppResult<Json<PushChunkResponse>> {
    let id = parse_session_id(&id)?;
    let payload = STANDARD
        .decode(body.payload.as_bytes())
        .map_err(|e| AppError::validation(format!("payload is not valid base64: {}", e)))?;
    let accepted = state.synchronizer.push_chunk(&id, body.sequence, payload).await?;
    Ok(Json(PushChunkResponse { accepted }))
}

async fn commit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommitBody>,
) -> AppResult<Json<CommitResponse>> {
    let id = parse_session_id(&id)?;
    let installed_version = state.synchronizer.commit(&id, &body.checksum).await?;
    Ok(Json(CommitResponse { installed_version }))
}

async fn abort(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AbortBody>,
) -> AppResult<StatusCode> {
    let id = parse_session_id(&id)?;
    let reason = body.reason.unwrap_or_else(|| "aborted by client".to_string());
    state.synchronizer.abort(&id, &reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pull(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> AppResult<Json<CommitResponse>> {
    let installed_version = state
        .synchronizer
        .pull(&body.provider, body.dataset.as_deref(), &body.version)
        .await?;
    Ok(Json(CommitResponse { installed_version }))
}
