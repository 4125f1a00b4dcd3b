//! 集成测试共用的 provider 桩与构造辅助

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jit_access::application::orchestrator::{GrantOrchestrator, OrchestratorSettings};
use jit_access::domain::catalog::PermissionEntry;
use jit_access::domain::grant::{Execution, ExecutionId, ExecutionRepository, ExecutionState};
use jit_access::domain::policy::EffectivePolicy;
use jit_access::domain::role::{
    Identity, Role, RoleId, RoleRegistry, Scopes, User, WorkflowDefinition, WorkflowStep,
};
use jit_access::infrastructure::persistence::{InMemoryExecutionRepository, InMemoryGrantRepository};
use jit_access::provider::{
    ApprovalNotification, Authorizer, CallContext, GrantHandle, IdentityDirectory, Notifier,
    Provider, ProviderRegistry, RoleBasedAccessControl,
};
use jit_common::{PagedResult, Pagination, RetryConfig};
use jit_errors::{AppError, AppResult, ProviderCallError};
use jit_ports::{AlertPort, OperatorAlert};

pub const AUTHORIZER: &str = "cloud";
pub const NOTIFIER: &str = "chat";

/// 按脚本依次返回失败，脚本耗尽后成功
#[derive(Default)]
pub struct ScriptedAuthorizer {
    authorize_failures: Mutex<VecDeque<ProviderCallError>>,
    revoke_failures: Mutex<VecDeque<ProviderCallError>>,
    authorize_calls: AtomicU32,
    revoke_calls: AtomicU32,
    authorize_keys: Mutex<Vec<String>>,
    revoked_keys: Mutex<Vec<String>>,
}

impl ScriptedAuthorizer {
    pub fn fail_authorize(&self, errors: impl IntoIterator<Item = ProviderCallError>) {
        self.authorize_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_revoke(&self, errors: impl IntoIterator<Item = ProviderCallError>) {
        self.revoke_failures.lock().unwrap().extend(errors);
    }

    pub fn authorize_calls(&self) -> u32 {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> u32 {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn authorize_keys(&self) -> Vec<String> {
        self.authorize_keys.lock().unwrap().clone()
    }

    /// 成功撤销所用的幂等键
    pub fn revoked_keys(&self) -> Vec<String> {
        self.revoked_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedAuthorizer {
    fn kind(&self) -> &str {
        "scripted"
    }

    fn authorizer(self: Arc<Self>) -> Option<Arc<dyn Authorizer>> {
        Some(self)
    }
}

#[async_trait]
impl Authorizer for ScriptedAuthorizer {
    async fn authorize_role(
        &self,
        ctx: &CallContext,
        _subject: &Identity,
        _policy: &EffectivePolicy,
    ) -> Result<GrantHandle, ProviderCallError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize_keys.lock().unwrap().push(ctx.idempotency_key.clone());
        if let Some(err) = self.authorize_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(GrantHandle::new(format!("binding-{}", ctx.execution_id)))
    }

    async fn revoke_role(
        &self,
        ctx: &CallContext,
        _subject: &Identity,
        _policy: &EffectivePolicy,
        _handle: &GrantHandle,
    ) -> Result<(), ProviderCallError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.revoke_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.revoked_keys.lock().unwrap().push(ctx.idempotency_key.clone());
        Ok(())
    }
}

/// 记录收到的审批通知
#[derive(Default)]
pub struct RecordingNotifier {
    failures: Mutex<VecDeque<ProviderCallError>>,
    sent: Mutex<Vec<(CallContext, ApprovalNotification)>>,
}

impl RecordingNotifier {
    pub fn fail_with(&self, errors: impl IntoIterator<Item = ProviderCallError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn sent(&self) -> Vec<(CallContext, ApprovalNotification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for RecordingNotifier {
    fn kind(&self) -> &str {
        "recording"
    }

    fn notifier(self: Arc<Self>) -> Option<Arc<dyn Notifier>> {
        Some(self)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(
        &self,
        ctx: &CallContext,
        notification: &ApprovalNotification,
    ) -> Result<(), ProviderCallError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push((ctx.clone(), notification.clone()));
        Ok(())
    }
}

/// 固定内容的 RBAC 目录
pub struct StaticRbac {
    pub roles: Vec<Role>,
    pub permissions: Vec<PermissionEntry>,
}

#[async_trait]
impl Provider for StaticRbac {
    fn kind(&self) -> &str {
        "static-rbac"
    }

    fn rbac(self: Arc<Self>) -> Option<Arc<dyn RoleBasedAccessControl>> {
        Some(self)
    }
}

#[async_trait]
impl RoleBasedAccessControl for StaticRbac {
    async fn get_role(&self, id: &RoleId) -> AppResult<Option<Role>> {
        Ok(self.roles.iter().find(|r| &r.id == id).cloned())
    }

    async fn list_roles(&self, pagination: &Pagination) -> AppResult<PagedResult<Role>> {
        Ok(PagedResult::from_slice(&self.roles, pagination))
    }

    async fn get_permission(&self, id: &str) -> AppResult<Option<PermissionEntry>> {
        Ok(self.permissions.iter().find(|p| p.id == id).cloned())
    }

    async fn list_permissions(&self, pagination: &Pagination) -> AppResult<PagedResult<PermissionEntry>> {
        Ok(PagedResult::from_slice(&self.permissions, pagination))
    }
}

/// 固定内容的身份目录
pub struct StaticDirectory {
    pub identities: Vec<Identity>,
}

#[async_trait]
impl Provider for StaticDirectory {
    fn kind(&self) -> &str {
        "static-directory"
    }

    fn identity(self: Arc<Self>) -> Option<Arc<dyn IdentityDirectory>> {
        Some(self)
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn get_identity(&self, id: &str) -> AppResult<Option<Identity>> {
        Ok(self.identities.iter().find(|i| i.id() == id).cloned())
    }

    async fn list_identities(&self, pagination: &Pagination) -> AppResult<PagedResult<Identity>> {
        Ok(PagedResult::from_slice(&self.identities, pagination))
    }
}

/// 记录运维告警
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl RecordingAlerts {
    pub fn keys(&self) -> Vec<String> {
        self.alerts.lock().unwrap().iter().map(|a| a.key.clone()).collect()
    }
}

#[async_trait]
impl AlertPort for RecordingAlerts {
    async fn raise(&self, alert: &OperatorAlert) -> AppResult<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// 写入指定状态时按预设次数失败的执行仓储
pub struct FlakyExecutions {
    inner: Arc<InMemoryExecutionRepository>,
    failures: Mutex<Vec<(ExecutionState, fn() -> AppError)>>,
}

impl FlakyExecutions {
    pub fn new(inner: Arc<InMemoryExecutionRepository>) -> Self {
        Self {
            inner,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_update_to(&self, state: ExecutionState, times: usize, error: fn() -> AppError) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(std::iter::repeat_n((state, error), times));
    }
}

#[async_trait]
impl ExecutionRepository for FlakyExecutions {
    async fn insert(&self, execution: &Execution) -> AppResult<()> {
        self.inner.insert(execution).await
    }

    async fn update(&self, execution: &Execution) -> AppResult<u64> {
        let failure = {
            let mut failures = self.failures.lock().unwrap();
            failures
                .iter()
                .position(|(state, _)| *state == execution.state)
                .map(|index| failures.remove(index).1)
        };
        if let Some(error) = failure {
            return Err(error());
        }
        self.inner.update(execution).await
    }

    async fn get(&self, id: &ExecutionId) -> AppResult<Option<Execution>> {
        self.inner.get(id).await
    }

    async fn list_unfinished(&self) -> AppResult<Vec<Execution>> {
        self.inner.list_unfinished().await
    }
}

/// 编排测试环境
///
/// - `reader`: 无审批流程，provider 为 cloud，最长 1 小时
/// - `operator`: 继承 reader，需要 chat 审批，仅限 ops 组
pub struct Fixture {
    pub roles: Arc<RoleRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub authorizer: Arc<ScriptedAuthorizer>,
    pub notifier: Arc<RecordingNotifier>,
    pub alerts: Arc<RecordingAlerts>,
    pub executions: Arc<InMemoryExecutionRepository>,
    pub grants: Arc<InMemoryGrantRepository>,
}

impl Fixture {
    pub fn new() -> Self {
        let roles = Arc::new(RoleRegistry::new());
        roles.replace_administrative(
            [
                Role::new("reader")
                    .allow_permission("s3:Get*")
                    .allow_resource("arn:aws:s3:::*")
                    .with_provider(AUTHORIZER)
                    .with_max_duration_secs(3600),
                Role::new("operator")
                    .inherits("reader")
                    .allow_permission("ec2:*")
                    .with_scopes(ops_scopes())
                    .with_workflow("lead-approval"),
            ],
            [WorkflowDefinition::new("lead-approval").with_step(lead_step())],
        );

        let providers = Arc::new(ProviderRegistry::new());
        let authorizer = Arc::new(ScriptedAuthorizer::default());
        let notifier = Arc::new(RecordingNotifier::default());
        providers.register(AUTHORIZER, authorizer.clone()).unwrap();
        providers.register(NOTIFIER, notifier.clone()).unwrap();

        Self {
            roles,
            providers,
            authorizer,
            notifier,
            alerts: Arc::new(RecordingAlerts::default()),
            executions: Arc::new(InMemoryExecutionRepository::new()),
            grants: Arc::new(InMemoryGrantRepository::new()),
        }
    }

    /// 共享同一组仓储与 provider，可多次调用以模拟重启
    pub fn orchestrator(&self, settings: OrchestratorSettings) -> GrantOrchestrator {
        GrantOrchestrator::new(
            self.roles.clone(),
            self.providers.clone(),
            self.executions.clone(),
            self.grants.clone(),
            self.alerts.clone(),
            settings,
        )
    }

    /// 换用指定的执行仓储
    pub fn orchestrator_over(
        &self,
        executions: Arc<dyn ExecutionRepository>,
        settings: OrchestratorSettings,
    ) -> GrantOrchestrator {
        GrantOrchestrator::new(
            self.roles.clone(),
            self.providers.clone(),
            executions,
            self.grants.clone(),
            self.alerts.clone(),
            settings,
        )
    }
}

pub fn ops_scopes() -> Scopes {
    Scopes {
        groups: ["ops".to_string()].into_iter().collect(),
        ..Scopes::default()
    }
}

pub fn lead_step() -> WorkflowStep {
    let mut step = WorkflowStep::new(NOTIFIER);
    step.channel = Some("#access".to_string());
    step.approvers = vec!["lead".to_string()];
    step
}

pub fn ops_user() -> Identity {
    User::new("alice@example.com").with_groups(["ops"]).into()
}

pub fn outsider() -> Identity {
    User::new("mallory@example.org").into()
}

/// 毫秒级退避，便于测试
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        authorize_retry: RetryConfig::new(3, Duration::from_millis(5), Duration::from_millis(20)),
        notify_retry: RetryConfig::new(2, Duration::from_millis(5), Duration::from_millis(10)),
        revoke_backoff: RetryConfig::new(u32::MAX, Duration::from_millis(5), Duration::from_millis(20)),
        revoke_max_attempts: None,
        alert_after_attempts: 3,
        approval_timeout: Duration::from_secs(60),
        default_duration: Duration::from_secs(1),
    }
}

/// 轮询直到条件成立，5 秒内未满足则失败
pub async fn wait_until<F>(orchestrator: &GrantOrchestrator, id: &ExecutionId, predicate: F) -> Execution
where
    F: Fn(&Execution) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let execution = orchestrator.get(id).await.expect("execution should exist");
        if predicate(&execution) {
            return execution;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "execution {} stuck in {} (failure: {:?})",
                id, execution.state, execution.failure
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(
    orchestrator: &GrantOrchestrator,
    id: &ExecutionId,
    state: jit_access::domain::grant::ExecutionState,
) -> Execution {
    wait_until(orchestrator, id, |e| e.state == state).await
}
