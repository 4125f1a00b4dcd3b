//! Provider 能力接口
//!
//! 后端集成只需实现自己支持的能力 trait，编排器与同步器只依赖这些接口

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use jit_common::{PagedResult, Pagination};
use jit_errors::{AppResult, ProviderCallError};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::PermissionEntry;
use crate::domain::policy::EffectivePolicy;
use crate::domain::role::{Identity, Role, RoleId};

/// 能力种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Authorizer,
    Notifier,
    RoleBasedAccessControl,
    Identity,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorizer => "Authorizer",
            Self::Notifier => "Notifier",
            Self::RoleBasedAccessControl => "RoleBasedAccessControl",
            Self::Identity => "Identity",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次 provider 调用的上下文
///
/// 同一逻辑操作的重试共用 `idempotency_key`，provider 据此去重
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub execution_id: String,
    pub idempotency_key: String,
    /// 从 1 开始
    pub attempt: u32,
}

impl CallContext {
    pub fn new(execution_id: impl Into<String>, idempotency_key: impl Into<String>, attempt: u32) -> Self {
        Self {
            execution_id: execution_id.into(),
            idempotency_key: idempotency_key.into(),
            attempt,
        }
    }
}

/// 授权成功后 provider 返回的句柄，撤销时原样传回
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantHandle {
    pub reference: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl GrantHandle {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// 审批通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotification {
    pub execution_id: String,
    pub workflow: String,
    pub step: usize,
    #[serde(default)]
    pub channel: Option<String>,
    pub approvers: Vec<String>,
    pub subject: String,
    pub role_id: RoleId,
    pub duration_secs: u64,
    #[serde(default)]
    pub reason: Option<String>,
    /// 审批方回调时携带的信号标识
    pub signal: String,
}

/// 授予/撤销访问
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize_role(
        &self,
        ctx: &CallContext,
        subject: &Identity,
        policy: &EffectivePolicy,
    ) -> Result<GrantHandle, ProviderCallError>;

    async fn revoke_role(
        &self,
        ctx: &CallContext,
        subject: &Identity,
        policy: &EffectivePolicy,
        handle: &GrantHandle,
    ) -> Result<(), ProviderCallError>;
}

/// 发送审批通知
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(
        &self,
        ctx: &CallContext,
        notification: &ApprovalNotification,
    ) -> Result<(), ProviderCallError>;
}

/// 列出 provider 侧的角色与权限
#[async_trait]
pub trait RoleBasedAccessControl: Send + Sync {
    async fn get_role(&self, id: &RoleId) -> AppResult<Option<Role>>;

    async fn list_roles(&self, pagination: &Pagination) -> AppResult<PagedResult<Role>>;

    async fn get_permission(&self, id: &str) -> AppResult<Option<PermissionEntry>>;

    async fn list_permissions(&self, pagination: &Pagination) -> AppResult<PagedResult<PermissionEntry>>;
}

/// 身份目录
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_identity(&self, id: &str) -> AppResult<Option<Identity>>;

    async fn list_identities(&self, pagination: &Pagination) -> AppResult<PagedResult<Identity>>;

    /// 刷新 provider 侧缓存
    async fn refresh(&self) -> AppResult<()> {
        Ok(())
    }
}
