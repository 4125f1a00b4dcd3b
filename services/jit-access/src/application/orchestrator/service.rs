//! 授权编排器
//!
//! 每个访问请求对应一条持久化的执行记录，按
//! Requested -> PendingApproval -> Approved -> Granting -> Active -> Expiring -> Revoked
//! 推进 (任一授予前阶段都可能进入 Failed)。
//!
//! - 每次状态变更都先落库再继续，重启后 `resume` 从最后落库的状态接着执行
//! - 审批信号只在 PendingApproval 阶段被接受，靠 revision 条件写保证先落库者胜出
//! - 同一执行同一时刻只有一个驱动任务
//! - 授权有界重试，撤销不设上限 (可配置暂停阈值)，超过告警阈值后通知运维

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jit_common::with_conditional_retry;
use jit_errors::{AppError, AppResult, ProviderCallError};
use jit_ports::{AlertPort, OperatorAlert};
use metrics::counter;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::settings::OrchestratorSettings;
use crate::domain::grant::{
    AccessRequest, Decision, Execution, ExecutionId, ExecutionRepository, ExecutionState, Grant,
    GrantId, GrantRepository, GrantState,
};
use crate::domain::role::RoleRegistry;
use crate::provider::{ApprovalNotification, Authorizer, CallContext, Notifier, ProviderRegistry};

const SYSTEM_ACTOR: &str = "system";

/// 驱动循环的单步结果
enum Step {
    Continue,
    Suspend,
}

struct DriverSlot {
    /// 驱动运行期间收到新的推进请求
    rerun: bool,
    wake: Arc<Notify>,
}

struct Inner {
    roles: Arc<RoleRegistry>,
    providers: Arc<ProviderRegistry>,
    executions: Arc<dyn ExecutionRepository>,
    grants: Arc<dyn GrantRepository>,
    alerts: Arc<dyn AlertPort>,
    settings: OrchestratorSettings,
    drivers: Mutex<HashMap<ExecutionId, DriverSlot>>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct GrantOrchestrator {
    inner: Arc<Inner>,
}

impl GrantOrchestrator {
    pub fn new(
        roles: Arc<RoleRegistry>,
        providers: Arc<ProviderRegistry>,
        executions: Arc<dyn ExecutionRepository>,
        grants: Arc<dyn GrantRepository>,
        alerts: Arc<dyn AlertPort>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                roles,
                providers,
                executions,
                grants,
                alerts,
                settings,
                drivers: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// 提交访问请求
    ///
    /// 解析与能力检查同步完成，失败时不创建执行也不调用任何 provider。
    /// 返回时执行已处于 PendingApproval (或无需审批时的 Approved / 通知失败时的 Failed)
    pub async fn request(&self, request: AccessRequest) -> AppResult<Execution> {
        if request.duration.is_zero() {
            return Err(AppError::validation("duration must be positive"));
        }
        if grant_lifetime(request.duration).is_none() {
            return Err(AppError::validation(format!(
                "requested duration {}s is out of range",
                request.duration.as_secs()
            )));
        }

        let policy = self.inner.roles.resolve(&request.role_id, &request.identity)?;

        if let Some(max) = policy.max_duration() {
            if request.duration > max {
                return Err(AppError::validation(format!(
                    "requested duration {}s exceeds the maximum of {}s for role {}",
                    request.duration.as_secs(),
                    max.as_secs(),
                    request.role_id
                )));
            }
        }

        let provider_id = match &request.provider {
            Some(provider) if policy.permits_provider(provider) => provider.clone(),
            Some(provider) => {
                return Err(AppError::validation(format!(
                    "provider {} is not permitted for role {}",
                    provider, request.role_id
                )));
            }
            None => policy.default_provider().map(str::to_string).ok_or_else(|| {
                AppError::configuration(format!("role {} has no provider", request.role_id))
            })?,
        };

        self.inner.providers.dispatch::<dyn Authorizer>(&provider_id)?;
        for workflow in &policy.workflows {
            for step in &workflow.steps {
                self.inner.providers.dispatch::<dyn Notifier>(&step.notifier)?;
            }
        }

        let mut execution = Execution::new(request, policy, provider_id);
        self.inner.executions.insert(&execution).await?;
        counter!("jit_transitions_total", "to" => ExecutionState::Requested.as_str()).increment(1);
        info!(
            execution = %execution.id,
            role = %execution.request.role_id,
            subject = %execution.policy.subject,
            provider = %execution.provider_id,
            "Access requested"
        );

        if let Err(e) = self.request_approval(&mut execution).await {
            // 记录已落库但停在 Requested，交给驱动任务重试
            warn!(execution = %execution.id, error = %e, "Approval request failed, handing over to driver");
            self.spawn_driver(execution.id);
            return Err(e);
        }
        match execution.state {
            ExecutionState::PendingApproval => self.arm_approval_timeout(&execution),
            ExecutionState::Approved => self.spawn_driver(execution.id),
            _ => {}
        }
        Ok(execution)
    }

    pub async fn approve(&self, id: &ExecutionId, actor: &str, reason: Option<String>) -> AppResult<Execution> {
        self.signal(id, Decision::Approve, actor, reason).await
    }

    pub async fn deny(&self, id: &ExecutionId, actor: &str, reason: Option<String>) -> AppResult<Execution> {
        self.signal(id, Decision::Deny, actor, reason).await
    }

    pub async fn cancel(&self, id: &ExecutionId, actor: &str, reason: Option<String>) -> AppResult<Execution> {
        self.signal(id, Decision::Cancel, actor, reason).await
    }

    /// 提前撤销一个生效中的授予
    pub async fn revoke_now(&self, id: &ExecutionId) -> AppResult<Execution> {
        let mut execution = self.load(id).await?;
        match execution.state {
            ExecutionState::Expiring => return Ok(execution),
            ExecutionState::Active => {}
            state => {
                return Err(AppError::conflict(format!(
                    "execution {} has no active grant (state {})",
                    id, state
                )));
            }
        }

        self.begin_expiry(&mut execution).await?;
        info!(execution = %id, "Early revocation requested");
        self.spawn_driver(execution.id);
        Ok(execution)
    }

    /// 恢复因达到尝试上限而暂停的撤销
    pub async fn retry_revoke(&self, id: &ExecutionId) -> AppResult<Execution> {
        let mut execution = self.load(id).await?;
        if execution.state != ExecutionState::Expiring || !execution.revoke_parked {
            return Err(AppError::conflict(format!(
                "execution {} has no parked revocation (state {})",
                id, execution.state
            )));
        }

        execution.revoke_parked = false;
        execution.revoke_attempts = 0;
        execution.revoke_alerted = false;
        let state = execution.state;
        self.persist(&mut execution, state).await?;
        info!(execution = %id, "Parked revocation resumed");
        self.spawn_driver(execution.id);
        Ok(execution)
    }

    pub async fn get(&self, id: &ExecutionId) -> AppResult<Execution> {
        self.load(id).await
    }

    pub async fn grant(&self, id: &GrantId) -> AppResult<Grant> {
        self.inner
            .grants
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("grant {}", id)))
    }

    /// 重启后恢复所有未完成的执行，返回数量
    pub async fn resume(&self) -> AppResult<usize> {
        let unfinished = self.inner.executions.list_unfinished().await?;
        for execution in &unfinished {
            match execution.state {
                ExecutionState::PendingApproval => self.arm_approval_timeout(execution),
                ExecutionState::Expiring if execution.revoke_parked => {
                    debug!(execution = %execution.id, "Revocation stays parked");
                }
                _ => self.spawn_driver(execution.id),
            }
        }
        info!(count = unfinished.len(), "Unfinished executions resumed");
        Ok(unfinished.len())
    }

    /// 停止所有计时器与驱动任务，执行状态保留在存储中
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn signal(
        &self,
        id: &ExecutionId,
        decision: Decision,
        actor: &str,
        reason: Option<String>,
    ) -> AppResult<Execution> {
        let mut execution = self.load(id).await?;
        let from = execution.state;
        execution.decide(decision, actor, reason)?;

        match self.persist(&mut execution, from).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                let current = self.load(id).await?;
                return Err(AppError::conflict(format!(
                    "execution {} was already decided (state {})",
                    id, current.state
                )));
            }
            Err(e) => return Err(e),
        }

        info!(execution = %id, decision = %decision, actor, "Approval signal recorded");
        if execution.state == ExecutionState::Approved {
            self.spawn_driver(execution.id);
        }
        Ok(execution)
    }

    /// Requested 阶段: 按流程步骤发送审批通知，随后挂起等待信号
    async fn request_approval(&self, execution: &mut Execution) -> AppResult<()> {
        let from = execution.state;

        if !execution.policy.requires_approval() {
            execution.transition(ExecutionState::PendingApproval)?;
            execution.decide(
                Decision::Approve,
                SYSTEM_ACTOR,
                Some("role has no approval workflow".to_string()),
            )?;
            return self.persist(execution, from).await;
        }

        let signal = format!("approval:{}", execution.id);
        let workflows = execution.policy.workflows.clone();
        for workflow in &workflows {
            for (index, step) in workflow.steps.iter().enumerate() {
                let notifier = match self.inner.providers.dispatch::<dyn Notifier>(&step.notifier) {
                    Ok(notifier) => notifier,
                    Err(e) => {
                        execution.fail(format!("approval notification failed: {}", e))?;
                        return self.persist(execution, from).await;
                    }
                };

                let notification = ApprovalNotification {
                    execution_id: execution.id.to_string(),
                    workflow: workflow.id.to_string(),
                    step: index,
                    channel: step.channel.clone(),
                    approvers: step.approvers.clone(),
                    subject: execution.policy.subject.clone(),
                    role_id: execution.request.role_id.clone(),
                    duration_secs: execution.request.duration.as_secs(),
                    reason: execution.request.reason.clone(),
                    signal: signal.clone(),
                };
                let key = format!("{}:notify:{}:{}", execution.id, workflow.id, index);
                let execution_id = execution.id.to_string();
                let mut attempt = 0;

                let sent = with_conditional_retry(
                    &self.inner.settings.notify_retry,
                    "send_notification",
                    || {
                        attempt += 1;
                        let ctx = CallContext::new(execution_id.clone(), key.clone(), attempt);
                        let notifier = notifier.clone();
                        let notification = &notification;
                        async move { notifier.send_notification(&ctx, notification).await }
                    },
                    ProviderCallError::is_transient,
                )
                .await;

                if let Err(e) = sent {
                    execution.fail(format!("approval notification failed: {}", e))?;
                    return self.persist(execution, from).await;
                }
            }
        }

        execution.transition(ExecutionState::PendingApproval)?;
        execution.pending_signal = Some(signal);
        execution.approval_deadline = TimeDelta::from_std(self.inner.settings.approval_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_add_signed(timeout));
        self.persist(execution, from).await
    }

    fn arm_approval_timeout(&self, execution: &Execution) {
        let Some(deadline) = execution.approval_deadline else {
            return;
        };
        let this = self.clone();
        let id = execution.id;

        tokio::spawn(async move {
            let wait = (deadline - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = this.inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            match this.signal(&id, Decision::Timeout, SYSTEM_ACTOR, None).await {
                Ok(_) => info!(execution = %id, "Approval timed out"),
                Err(AppError::Conflict(_)) => {}
                Err(e) => warn!(execution = %id, error = %e, "Failed to record approval timeout"),
            }
        });
    }

    fn spawn_driver(&self, id: ExecutionId) {
        {
            let mut drivers = self.inner.drivers.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = drivers.get_mut(&id) {
                slot.rerun = true;
                slot.wake.notify_waiters();
                return;
            }
            drivers.insert(
                id,
                DriverSlot {
                    rerun: false,
                    wake: Arc::new(Notify::new()),
                },
            );
        }

        let this = self.clone();
        tokio::spawn(async move { this.run_driver(id).await });
    }

    async fn run_driver(self, id: ExecutionId) {
        loop {
            self.drive(&id).await;

            let again = {
                let mut drivers = self.inner.drivers.lock().unwrap_or_else(PoisonError::into_inner);
                match drivers.get_mut(&id) {
                    Some(slot) if slot.rerun && !self.inner.shutdown.is_cancelled() => {
                        slot.rerun = false;
                        true
                    }
                    _ => {
                        drivers.remove(&id);
                        false
                    }
                }
            };
            if !again {
                break;
            }
        }
    }

    async fn drive(&self, id: &ExecutionId) {
        let mut failures = 0;
        loop {
            if self.inner.shutdown.is_cancelled() {
                return;
            }
            match self.step(id).await {
                Ok(Step::Continue) => failures = 0,
                Ok(Step::Suspend) => return,
                Err(AppError::NotFound(_)) => {
                    warn!(execution = %id, "Execution disappeared from storage");
                    return;
                }
                Err(e) => {
                    if self.fail_before_grant(id, &e).await {
                        return;
                    }

                    failures += 1;
                    let delay = self.inner.settings.revoke_backoff.delay_for_attempt(failures - 1);
                    error!(
                        execution = %id,
                        error = %e,
                        failures,
                        delay_ms = delay.as_millis(),
                        "Execution step failed"
                    );
                    if failures == self.inner.settings.alert_after_attempts {
                        self.raise_alert(OperatorAlert::new(
                            format!("execution-stuck:{}", id),
                            format!("Execution {} cannot make progress", id),
                            format!("step failed {} times in a row: {}", failures, e),
                        ))
                        .await;
                    }
                    if !self.backoff(delay).await {
                        return;
                    }
                }
            }
        }
    }

    /// 授予前的不可恢复错误直接转入 Failed，返回 true 表示执行已结束
    ///
    /// 已发出过 AuthorizeRole 的执行不在此列，授权可能已生效，只能继续重试
    async fn fail_before_grant(&self, id: &ExecutionId, err: &AppError) -> bool {
        if err.is_retryable() || matches!(err, AppError::Conflict(_)) {
            return false;
        }
        let Ok(mut execution) = self.load(id).await else {
            return false;
        };
        let before_provider = match execution.state {
            ExecutionState::Requested | ExecutionState::Approved => true,
            ExecutionState::Granting => execution.authorize_attempts == 0,
            _ => false,
        };
        if !before_provider {
            return false;
        }

        let from = execution.state;
        if execution.fail(format!("internal error: {}", err)).is_err() {
            return false;
        }
        match self.persist(&mut execution, from).await {
            Ok(()) => {
                error!(execution = %id, error = %err, "Execution failed on unrecoverable error");
                true
            }
            Err(e) => {
                warn!(execution = %id, error = %e, "Failed to record execution failure");
                false
            }
        }
    }

    async fn step(&self, id: &ExecutionId) -> AppResult<Step> {
        let mut execution = self.load(id).await?;
        match execution.state {
            ExecutionState::Requested => {
                self.request_approval(&mut execution).await?;
                if execution.state == ExecutionState::PendingApproval {
                    self.arm_approval_timeout(&execution);
                }
                Ok(Step::Continue)
            }
            ExecutionState::PendingApproval => Ok(Step::Suspend),
            ExecutionState::Approved => {
                execution.transition(ExecutionState::Granting)?;
                self.persist(&mut execution, ExecutionState::Approved).await?;
                Ok(Step::Continue)
            }
            ExecutionState::Granting => {
                self.authorize(execution).await?;
                Ok(Step::Continue)
            }
            ExecutionState::Active => self.await_expiry(execution).await,
            ExecutionState::Expiring if execution.revoke_parked => Ok(Step::Suspend),
            ExecutionState::Expiring => self.revoke(execution).await,
            ExecutionState::Revoked | ExecutionState::Failed => Ok(Step::Suspend),
        }
    }

    /// Granting 阶段: 有界重试调用 AuthorizeRole
    async fn authorize(&self, mut execution: Execution) -> AppResult<()> {
        let authorizer = match self.inner.providers.dispatch::<dyn Authorizer>(&execution.provider_id) {
            Ok(authorizer) => authorizer,
            Err(e) => {
                execution.fail(e.to_string())?;
                return self.persist(&mut execution, ExecutionState::Granting).await;
            }
        };
        let retry = &self.inner.settings.authorize_retry;
        let max_attempts = retry.max_attempts.max(1);
        // 请求时已校验范围，这里只做饱和处理
        let lifetime = TimeDelta::from_std(execution.request.duration).unwrap_or(TimeDelta::MAX);

        loop {
            // 先记录尝试再调用，重启后不会丢失计数
            let grant_id = *execution.grant_id.get_or_insert_with(GrantId::new);
            execution.authorize_attempts += 1;
            self.persist(&mut execution, ExecutionState::Granting).await?;

            let attempt = execution.authorize_attempts;
            let ctx = CallContext::new(execution.id.to_string(), execution.authorize_key(), attempt);
            let result = authorizer
                .authorize_role(&ctx, &execution.request.identity, &execution.policy)
                .await;

            match result {
                Ok(handle) => {
                    counter!("jit_authorize_attempts_total", "outcome" => "success").increment(1);
                    let issued_at = Utc::now();
                    let expires_at = issued_at
                        .checked_add_signed(lifetime)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    let grant = Grant {
                        id: grant_id,
                        execution_id: execution.id,
                        subject: execution.request.identity.clone(),
                        role_id: execution.request.role_id.clone(),
                        provider_id: execution.provider_id.clone(),
                        policy: execution.policy.clone(),
                        handle,
                        state: GrantState::Active,
                        issued_at,
                        expires_at,
                        authorize_attempts: attempt,
                        revoke_attempts: 0,
                        revoked_at: None,
                    };
                    self.inner.grants.save_active(&grant).await?;

                    execution.transition(ExecutionState::Active)?;
                    self.persist(&mut execution, ExecutionState::Granting).await?;
                    info!(
                        execution = %execution.id,
                        grant = %grant.id,
                        expires_at = %grant.expires_at,
                        attempt,
                        "Access granted"
                    );
                    return Ok(());
                }
                Err(e) if !e.is_transient() => {
                    counter!("jit_authorize_attempts_total", "outcome" => "permanent").increment(1);
                    execution.fail(format!("authorization rejected: {}", e))?;
                    return self.persist(&mut execution, ExecutionState::Granting).await;
                }
                Err(e) => {
                    counter!("jit_authorize_attempts_total", "outcome" => "transient").increment(1);
                    if attempt >= max_attempts {
                        execution.fail(format!(
                            "authorization failed after {} attempts: {}",
                            attempt, e
                        ))?;
                        return self.persist(&mut execution, ExecutionState::Granting).await;
                    }

                    let delay = retry.delay_for_attempt(attempt - 1);
                    warn!(
                        execution = %execution.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Authorization failed, retrying"
                    );
                    if !self.backoff(delay).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Active 阶段: 等到过期时间或提前撤销
    async fn await_expiry(&self, mut execution: Execution) -> AppResult<Step> {
        let grant = self.load_grant(&execution).await?;
        let now = Utc::now();
        if !grant.is_expired(now) {
            let wait = (grant.expires_at - now).to_std().unwrap_or_default();
            debug!(execution = %execution.id, wait_ms = wait.as_millis(), "Waiting for grant expiry");
            return Ok(if self.wait_for_wake(&execution.id, wait).await {
                Step::Continue
            } else {
                Step::Suspend
            });
        }

        self.begin_expiry(&mut execution).await?;
        Ok(Step::Continue)
    }

    async fn begin_expiry(&self, execution: &mut Execution) -> AppResult<()> {
        let mut grant = self.load_grant(execution).await?;
        execution.transition(ExecutionState::Expiring)?;
        self.persist(execution, ExecutionState::Active).await?;

        grant.state = GrantState::Expiring;
        self.inner.grants.save_active(&grant).await
    }

    /// Expiring 阶段: 持续重试 RevokeRole 直到成功
    async fn revoke(&self, mut execution: Execution) -> AppResult<Step> {
        let mut grant = self.load_grant(&execution).await?;
        let settings = &self.inner.settings;

        loop {
            if let Some(max) = settings.revoke_max_attempts {
                if execution.revoke_attempts >= max {
                    return self.park_revocation(execution).await;
                }
            }

            execution.revoke_attempts += 1;
            self.persist(&mut execution, ExecutionState::Expiring).await?;

            let attempt = execution.revoke_attempts;
            let ctx = CallContext::new(execution.id.to_string(), execution.revoke_key(), attempt);
            let result = match self.inner.providers.dispatch::<dyn Authorizer>(&execution.provider_id) {
                Ok(authorizer) => authorizer
                    .revoke_role(&ctx, &grant.subject, &grant.policy, &grant.handle)
                    .await
                    .map_err(AppError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    counter!("jit_revoke_attempts_total", "outcome" => "success").increment(1);
                    grant.state = GrantState::Revoked;
                    grant.revoke_attempts = attempt;
                    grant.revoked_at = Some(Utc::now());
                    self.inner.grants.archive(&grant).await?;

                    execution.transition(ExecutionState::Revoked)?;
                    self.persist(&mut execution, ExecutionState::Expiring).await?;
                    info!(execution = %execution.id, grant = %grant.id, attempt, "Access revoked");
                    return Ok(Step::Suspend);
                }
                Err(e) => {
                    let outcome = if e.is_retryable() { "transient" } else { "permanent" };
                    counter!("jit_revoke_attempts_total", "outcome" => outcome).increment(1);

                    let delay = settings.revoke_backoff.delay_for_attempt(attempt - 1);
                    warn!(
                        execution = %execution.id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Revocation failed, retrying"
                    );

                    let threshold_reached = attempt >= settings.alert_after_attempts || !e.is_retryable();
                    if threshold_reached && !execution.revoke_alerted {
                        self.raise_alert(OperatorAlert::new(
                            format!("revoke-stuck:{}", execution.id),
                            format!("Revocation of grant {} keeps failing", grant.id),
                            format!(
                                "execution {} ({} on {}) failed to revoke after {} attempts: {}",
                                execution.id, execution.request.role_id, execution.provider_id, attempt, e
                            ),
                        ))
                        .await;
                        execution.revoke_alerted = true;
                        self.persist(&mut execution, ExecutionState::Expiring).await?;
                    }

                    if !self.backoff(delay).await {
                        return Ok(Step::Suspend);
                    }
                }
            }
        }
    }

    async fn park_revocation(&self, mut execution: Execution) -> AppResult<Step> {
        execution.revoke_parked = true;
        self.persist(&mut execution, ExecutionState::Expiring).await?;
        self.raise_alert(OperatorAlert::new(
            format!("revoke-parked:{}", execution.id),
            format!("Revocation of execution {} is parked", execution.id),
            format!(
                "revocation stopped after {} attempts and needs a manual retry",
                execution.revoke_attempts
            ),
        ))
        .await;
        warn!(execution = %execution.id, attempts = execution.revoke_attempts, "Revocation parked");
        Ok(Step::Suspend)
    }

    async fn raise_alert(&self, alert: OperatorAlert) {
        counter!("jit_operator_alerts_total").increment(1);
        if let Err(e) = self.inner.alerts.raise(&alert).await {
            error!(key = %alert.key, error = %e, "Failed to deliver operator alert");
        }
    }

    /// 重试退避，只会被关闭打断；关闭时返回 false
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.inner.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// 等到期限或被 `spawn_driver` 唤醒；关闭时返回 false
    async fn wait_for_wake(&self, id: &ExecutionId, delay: Duration) -> bool {
        let wake = {
            let drivers = self.inner.drivers.lock().unwrap_or_else(PoisonError::into_inner);
            drivers.get(id).map(|slot| slot.wake.clone())
        };
        let Some(wake) = wake else {
            return self.backoff(delay).await;
        };

        let notified = wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        // 先登记再检查标记，两者之间的唤醒不会丢
        if self.take_rerun(id) {
            return true;
        }

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
            _ = &mut notified => {
                self.take_rerun(id);
                true
            }
        }
    }

    fn take_rerun(&self, id: &ExecutionId) -> bool {
        let mut drivers = self.inner.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        match drivers.get_mut(id) {
            Some(slot) if slot.rerun => {
                slot.rerun = false;
                true
            }
            _ => false,
        }
    }

    /// 条件写入，非转换的更新 `from` 传当前状态
    async fn persist(&self, execution: &mut Execution, from: ExecutionState) -> AppResult<()> {
        execution.revision = self.inner.executions.update(execution).await?;
        if execution.state != from {
            counter!("jit_transitions_total", "to" => execution.state.as_str()).increment(1);
            info!(
                execution = %execution.id,
                from = %from,
                to = %execution.state,
                role = %execution.request.role_id,
                subject = %execution.policy.subject,
                "Execution transitioned"
            );
        }
        Ok(())
    }

    async fn load(&self, id: &ExecutionId) -> AppResult<Execution> {
        self.inner
            .executions
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("execution {}", id)))
    }

    async fn load_grant(&self, execution: &Execution) -> AppResult<Grant> {
        let grant_id = execution
            .grant_id
            .ok_or_else(|| AppError::internal(format!("execution {} has no grant", execution.id)))?;
        self.inner.grants.get(&grant_id).await?.ok_or_else(|| {
            AppError::internal(format!(
                "grant {} of execution {} is missing",
                grant_id, execution.id
            ))
        })
    }
}

/// 授予时长对应的 TimeDelta，加到当前时间会溢出时返回 None
fn grant_lifetime(duration: Duration) -> Option<TimeDelta> {
    let lifetime = TimeDelta::from_std(duration).ok()?;
    Utc::now().checked_add_signed(lifetime).map(|_| lifetime)
}
