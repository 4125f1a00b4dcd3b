//! HTTP 接口

mod catalog;
mod health;
mod requests;

use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::application::catalog::CatalogSynchronizer;
use crate::application::orchestrator::GrantOrchestrator;
use crate::domain::role::RoleRegistry;
use crate::provider::ProviderRegistry;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: GrantOrchestrator,
    pub synchronizer: Arc<CatalogSynchronizer>,
    pub providers: Arc<ProviderRegistry>,
    pub roles: Arc<RoleRegistry>,
    pub metrics: Option<PrometheusHandle>,
    /// 使用内存存储时为空
    pub database: Option<PgPool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(requests::routes())
        .merge(catalog::routes())
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
