//! 目录与同步会话仓储 trait

use async_trait::async_trait;
use jit_errors::AppResult;

use super::catalog::Catalog;
use super::session::{CatalogSession, SessionId};

/// 已安装目录仓储
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// 写入 (provider, dataset) 的当前目录，覆盖旧版本
    async fn save_installed(&self, catalog: &Catalog) -> AppResult<()>;

    async fn load_installed(&self) -> AppResult<Vec<Catalog>>;
}

/// 打开中的同步会话仓储
#[async_trait]
pub trait CatalogSessionRepository: Send + Sync {
    async fn save(&self, session: &CatalogSession) -> AppResult<()>;

    async fn remove(&self, id: &SessionId) -> AppResult<()>;

    async fn load_open(&self) -> AppResult<Vec<CatalogSession>>;
}
