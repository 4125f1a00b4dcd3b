//! 执行与授予仓储 trait

use async_trait::async_trait;
use jit_errors::AppResult;

use super::execution::{Execution, ExecutionId};
use super::grant::{Grant, GrantId};

/// 执行记录仓储
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// 写入新执行 (revision 0)
    async fn insert(&self, execution: &Execution) -> AppResult<()>;

    /// 条件更新
    ///
    /// 仅当存储中的 revision 等于 `execution.revision` 时写入，返回新的 revision；
    /// 否则返回 `AppError::Conflict`
    async fn update(&self, execution: &Execution) -> AppResult<u64>;

    async fn get(&self, id: &ExecutionId) -> AppResult<Option<Execution>>;

    /// 所有未到达终态的执行
    async fn list_unfinished(&self) -> AppResult<Vec<Execution>>;
}

/// 授予仓储
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// 写入或更新活动授予
    async fn save_active(&self, grant: &Grant) -> AppResult<()>;

    /// 从活动集合移到归档
    async fn archive(&self, grant: &Grant) -> AppResult<()>;

    /// 按 ID 查询 (活动或归档)
    async fn get(&self, id: &GrantId) -> AppResult<Option<Grant>>;

    async fn list_active(&self) -> AppResult<Vec<Grant>>;

    async fn list_archived(&self) -> AppResult<Vec<Grant>>;
}
