//! 基础设施资源
//!
//! 数据库是可选的: 未配置时服务使用内存存储

use jit_adapter_postgres::{connect_with_retry, Migration, MigrationManager, PostgresConfig};
use jit_common::RetryConfig;
use jit_config::AppConfig;
use jit_errors::AppResult;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// 启动时连接数据库的重试策略
fn startup_retry() -> RetryConfig {
    RetryConfig::new(5, Duration::from_millis(500), Duration::from_secs(10))
}

/// 按配置连接 PostgreSQL，未配置返回 `None`
pub async fn connect_database(config: &AppConfig) -> AppResult<Option<PgPool>> {
    let Some(database) = &config.database else {
        info!("No database configured, using in-memory storage");
        return Ok(None);
    };

    let pg_config = PostgresConfig::new(database.url.expose_secret().as_str())
        .with_max_connections(database.max_connections);
    let pool = connect_with_retry(&pg_config, &startup_retry()).await?;
    Ok(Some(pool))
}

/// 应用服务自带的迁移
pub async fn run_migrations(pool: &PgPool, migrations: &[Migration]) -> AppResult<()> {
    let report = MigrationManager::new(pool.clone()).migrate(migrations).await?;
    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "Database migrations finished"
    );
    Ok(())
}
