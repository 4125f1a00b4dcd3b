//! 持久化实现

pub mod catalog_repository;
pub mod error_mapper;
pub mod execution_repository;
pub mod grant_repository;
pub mod memory;
pub mod migrations;

pub use catalog_repository::{PostgresCatalogRepository, PostgresCatalogSessionRepository};
pub use execution_repository::PostgresExecutionRepository;
pub use grant_repository::PostgresGrantRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryCatalogSessionRepository, InMemoryExecutionRepository,
    InMemoryGrantRepository,
};
pub use migrations::migrations;

use std::sync::Arc;

use sqlx::PgPool;

use crate::domain::catalog::{CatalogRepository, CatalogSessionRepository};
use crate::domain::grant::{ExecutionRepository, GrantRepository};

/// 服务用到的全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub executions: Arc<dyn ExecutionRepository>,
    pub grants: Arc<dyn GrantRepository>,
    pub catalogs: Arc<dyn CatalogRepository>,
    pub sessions: Arc<dyn CatalogSessionRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            executions: Arc::new(InMemoryExecutionRepository::new()),
            grants: Arc::new(InMemoryGrantRepository::new()),
            catalogs: Arc::new(InMemoryCatalogRepository::new()),
            sessions: Arc::new(InMemoryCatalogSessionRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            executions: Arc::new(PostgresExecutionRepository::new(pool.clone())),
            grants: Arc::new(PostgresGrantRepository::new(pool.clone())),
            catalogs: Arc::new(PostgresCatalogRepository::new(pool.clone())),
            sessions: Arc::new(PostgresCatalogSessionRepository::new(pool)),
        }
    }
}
