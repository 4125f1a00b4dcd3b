//! 访问请求路由

use std::time::Duration;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use jit_errors::{AppError, AppResult};
use serde::Deserialize;

use super::AppState;
use crate::domain::grant::{AccessRequest, Execution, ExecutionId, Grant, GrantId};
use crate::domain::role::{Identity, RoleId};
use crate::provider::IdentityDirectory;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", post(create_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/approve", post(approve))
        .route("/api/requests/{id}/deny", post(deny))
        .route("/api/requests/{id}/cancel", post(cancel))
        .route("/api/requests/{id}/revoke", post(revoke))
        .route("/api/requests/{id}/retry-revoke", post(retry_revoke))
        .route("/api/grants/{id}", get(get_grant))
}

/// 通过 Identity 能力查找主体
#[derive(Debug, Deserialize)]
pub struct IdentityLookup {
    pub provider: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub identity_lookup: Option<IdentityLookup>,
    pub role: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

fn parse_execution_id(raw: &str) -> AppResult<ExecutionId> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("invalid execution id: {}", raw)))
}

fn require_actor(body: &DecisionBody) -> AppResult<&str> {
    let actor = body.actor.trim();
    if actor.is_empty() {
        return Err(AppError::validation("actor must not be empty"));
    }
    Ok(actor)
}

async fn resolve_identity(state: &AppState, body: &mut CreateRequestBody) -> AppResult<Identity> {
    match (body.identity.take(), &body.identity_lookup) {
        (Some(identity), None) => Ok(identity),
        (None, Some(lookup)) => {
            let directory = state.providers.dispatch::<dyn IdentityDirectory>(&lookup.provider)?;
            directory
                .get_identity(&lookup.id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("identity {} in {}", lookup.id, lookup.provider)))
        }
        _ => Err(AppError::validation(
            "exactly one of identity or identity_lookup is required",
        )),
    }
}

async fn create_request(
    State(state): State<AppState>,
    Json(mut body): Json<CreateRequestBody>,
) -> AppResult<(StatusCode, Json<Execution>)> {
    let identity = resolve_identity(&state, &mut body).await?;
    let duration = body
        .duration_secs
        .map(Duration::from_secs)
        .unwrap_or(state.orchestrator.settings().default_duration);

    let mut request = AccessRequest::new(identity, RoleId::new(body.role), duration);
    request.provider = body.provider;
    request.reason = body.reason;

    let execution = state.orchestrator.request(request).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

async fn get_request(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    Ok(Json(state.orchestrator.get(&id).await?))
}

async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    let actor = require_actor(&body)?;
    Ok(Json(state.orchestrator.approve(&id, actor, body.reason.clone()).await?))
}

async fn deny(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    let actor = require_actor(&body)?;
    Ok(Json(state.orchestrator.deny(&id, actor, body.reason.clone()).await?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    let actor = require_actor(&body)?;
    Ok(Json(state.orchestrator.cancel(&id, actor, body.reason.clone()).await?))
}

async fn revoke(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    Ok(Json(state.orchestrator.revoke_now(&id).await?))
}

async fn retry_revoke(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Execution>> {
    let id = parse_execution_id(&id)?;
    Ok(Json(state.orchestrator.retry_revoke(&id).await?))
}

async fn get_grant(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Grant>> {
    let id: GrantId = id
        .parse()
        .map_err(|_| AppError::validation(format!("invalid grant id: {}", id)))?;
    Ok(Json(state.orchestrator.grant(&id).await?))
}
