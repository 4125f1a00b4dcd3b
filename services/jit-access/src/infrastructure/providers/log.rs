//! 内置 provider
//!
//! - `log`: 把审批通知写入日志
//! - `dry-run`: 只记录授予/撤销，不访问任何后端，用于本地联调

use std::sync::Arc;

use async_trait::async_trait;
use jit_errors::{AppResult, ProviderCallError};
use tracing::info;

use crate::domain::policy::EffectivePolicy;
use crate::domain::role::Identity;
use crate::provider::{
    ApprovalNotification, Authorizer, CallContext, GrantHandle, Notifier, Provider, ProviderFactory,
    ProviderSettings,
};

pub const LOG_KIND: &str = "log";
pub const DRY_RUN_KIND: &str = "dry-run";

#[derive(Debug, Default)]
pub struct LogNotifier {
    channel: Option<String>,
}

#[async_trait]
impl Provider for LogNotifier {
    fn kind(&self) -> &str {
        LOG_KIND
    }

    async fn initialize(&mut self, settings: &ProviderSettings) -> AppResult<()> {
        self.channel = settings.optional("channel").map(str::to_string);
        Ok(())
    }

    fn notifier(self: Arc<Self>) -> Option<Arc<dyn Notifier>> {
        Some(self)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(
        &self,
        ctx: &CallContext,
        notification: &ApprovalNotification,
    ) -> Result<(), ProviderCallError> {
        let channel = notification.channel.as_deref().or(self.channel.as_deref()).unwrap_or("-");
        info!(
            execution = %notification.execution_id,
            workflow = %notification.workflow,
            step = notification.step,
            channel,
            approvers = ?notification.approvers,
            subject = %notification.subject,
            role = %notification.role_id,
            duration_secs = notification.duration_secs,
            signal = %notification.signal,
            idempotency_key = %ctx.idempotency_key,
            "Approval requested"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DryRunAuthorizer;

#[async_trait]
impl Provider for DryRunAuthorizer {
    fn kind(&self) -> &str {
        DRY_RUN_KIND
    }

    fn authorizer(self: Arc<Self>) -> Option<Arc<dyn Authorizer>> {
        Some(self)
    }
}

#[async_trait]
impl Authorizer for DryRunAuthorizer {
    async fn authorize_role(
        &self,
        ctx: &CallContext,
        subject: &Identity,
        policy: &EffectivePolicy,
    ) -> Result<GrantHandle, ProviderCallError> {
        info!(
            execution = %ctx.execution_id,
            subject = %subject.subject(),
            role = %policy.role_id,
            permissions = policy.permissions.allow.len(),
            "Dry-run authorize"
        );
        Ok(GrantHandle::new(ctx.idempotency_key.clone()))
    }

    async fn revoke_role(
        &self,
        ctx: &CallContext,
        subject: &Identity,
        policy: &EffectivePolicy,
        handle: &GrantHandle,
    ) -> Result<(), ProviderCallError> {
        info!(
            execution = %ctx.execution_id,
            subject = %subject.subject(),
            role = %policy.role_id,
            reference = %handle.reference,
            "Dry-run revoke"
        );
        Ok(())
    }
}

/// 注册内置类型的工厂
pub fn builtin_factory() -> ProviderFactory {
    ProviderFactory::new()
        .with_kind(LOG_KIND, || Box::new(LogNotifier::default()))
        .with_kind(DRY_RUN_KIND, || Box::new(DryRunAuthorizer))
}
