//! jit-access 服务入口

use std::net::SocketAddr;
use std::sync::Arc;

use jit_access::api::{router, AppState};
use jit_access::application::catalog::CatalogSynchronizer;
use jit_access::application::orchestrator::{GrantOrchestrator, OrchestratorSettings};
use jit_access::domain::role::{Role, RoleRegistry, WorkflowDefinition};
use jit_access::infrastructure::persistence::{migrations, Repositories};
use jit_access::infrastructure::providers::builtin_factory;
use jit_access::infrastructure::TracingAlertSink;
use jit_access::provider::ProviderRegistry;
use jit_bootstrap::{connect_database, init_runtime, run_migrations, shutdown_signal};
use jit_config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_dir)?;
    let metrics = init_runtime(&config);

    // 管理员定义的角色与流程
    let roles = Arc::new(RoleRegistry::new());
    let graph_version = roles.replace_administrative(
        config.roles.iter().cloned().map(Role::from),
        config.workflows.iter().cloned().map(WorkflowDefinition::from),
    );
    info!(roles = config.roles.len(), graph_version, "Administrative roles loaded");

    let providers = Arc::new(ProviderRegistry::new());
    builtin_factory().build_all(&config.providers, &providers).await?;

    let database = connect_database(&config).await?;
    let repositories = match &database {
        Some(pool) => {
            run_migrations(pool, &migrations()).await?;
            Repositories::postgres(pool.clone())
        }
        None => Repositories::in_memory(),
    };

    let synchronizer = Arc::new(CatalogSynchronizer::new(
        roles.clone(),
        providers.clone(),
        repositories.catalogs.clone(),
        repositories.sessions.clone(),
        config.catalog.clone(),
    ));
    synchronizer.restore().await?;

    let orchestrator = GrantOrchestrator::new(
        roles.clone(),
        providers.clone(),
        repositories.executions.clone(),
        repositories.grants.clone(),
        Arc::new(TracingAlertSink),
        OrchestratorSettings::from(&config.orchestrator),
    );
    orchestrator.resume().await?;

    let app = router(AppState {
        orchestrator: orchestrator.clone(),
        synchronizer,
        providers,
        roles,
        metrics,
        database,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "Starting jit-access");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();
    info!("jit-access stopped");
    Ok(())
}
