//! 授权执行记录
//!
//! 一次访问请求的持久化状态机。`revision` 用于乐观并发控制，
//! 所有状态变更都必须基于最新版本写入

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jit_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::grant::GrantId;
use crate::domain::policy::EffectivePolicy;
use crate::domain::role::{Identity, RoleId};

/// 执行 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(jit_common::new_id())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Requested,
    PendingApproval,
    Approved,
    Granting,
    Active,
    Expiring,
    Revoked,
    Failed,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Granting => "granting",
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Revoked => "revoked",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Failed)
    }

    /// 合法的状态转换
    ///
    /// 授予生效后 (Active/Expiring) 不能再进入 Failed，只能走撤销路径
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Requested, PendingApproval)
                | (Requested, Failed)
                | (PendingApproval, Approved)
                | (PendingApproval, Failed)
                | (Approved, Granting)
                | (Approved, Failed)
                | (Granting, Active)
                | (Granting, Failed)
                | (Active, Expiring)
                | (Expiring, Revoked)
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "granting" => Ok(Self::Granting),
            "active" => Ok(Self::Active),
            "expiring" => Ok(Self::Expiring),
            "revoked" => Ok(Self::Revoked),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::internal(format!("unknown execution state: {}", other))),
        }
    }
}

/// 审批阶段的外部信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
    Cancel,
    Timeout,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已记录的决定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 访问请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub identity: Identity,
    pub role_id: RoleId,
    /// 为空时使用有效策略中的第一个 provider
    #[serde(default)]
    pub provider: Option<String>,
    pub duration: Duration,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AccessRequest {
    pub fn new(identity: Identity, role_id: impl Into<RoleId>, duration: Duration) -> Self {
        Self {
            identity,
            role_id: role_id.into(),
            provider: None,
            duration,
            reason: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// 状态转换历史
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ExecutionState,
    pub to: ExecutionState,
    pub at: DateTime<Utc>,
}

/// 执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub revision: u64,
    pub state: ExecutionState,
    pub request: AccessRequest,
    /// 请求时解析出的策略快照
    pub policy: EffectivePolicy,
    pub provider_id: String,
    /// 挂起等待的审批信号
    #[serde(default)]
    pub pending_signal: Option<String>,
    #[serde(default)]
    pub approval_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision: Option<DecisionRecord>,
    #[serde(default)]
    pub grant_id: Option<GrantId>,
    #[serde(default)]
    pub authorize_attempts: u32,
    #[serde(default)]
    pub revoke_attempts: u32,
    #[serde(default)]
    pub revoke_alerted: bool,
    /// 撤销达到尝试上限后暂停，等待人工重试
    #[serde(default)]
    pub revoke_parked: bool,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub history: Vec<Transition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    pub fn new(request: AccessRequest, policy: EffectivePolicy, provider_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            revision: 0,
            state: ExecutionState::Requested,
            request,
            policy,
            provider_id: provider_id.into(),
            pending_signal: None,
            approval_deadline: None,
            decision: None,
            grant_id: None,
            authorize_attempts: 0,
            revoke_attempts: 0,
            revoke_alerted: false,
            revoke_parked: false,
            failure: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 状态转换，非法转换返回冲突
    pub fn transition(&mut self, next: ExecutionState) -> AppResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "execution {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        let now = Utc::now();
        self.history.push(Transition {
            from: self.state,
            to: next,
            at: now,
        });
        self.state = next;
        self.updated_at = now;
        if next != ExecutionState::PendingApproval {
            self.pending_signal = None;
        }
        Ok(())
    }

    /// 转入 Failed 并记录原因
    pub fn fail(&mut self, reason: impl Into<String>) -> AppResult<()> {
        self.transition(ExecutionState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// 记录审批决定并推进状态
    pub fn decide(&mut self, decision: Decision, actor: impl Into<String>, reason: Option<String>) -> AppResult<()> {
        if self.state != ExecutionState::PendingApproval {
            return Err(AppError::conflict(format!(
                "execution {} is not awaiting approval (state {})",
                self.id, self.state
            )));
        }
        let actor = actor.into();
        match decision {
            Decision::Approve => self.transition(ExecutionState::Approved)?,
            Decision::Deny => self.fail(format!("denied by {}", actor))?,
            Decision::Cancel => self.fail(format!("cancelled by {}", actor))?,
            Decision::Timeout => self.fail("approval timed out")?,
        }
        self.decision = Some(DecisionRecord {
            decision,
            actor,
            reason,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    pub fn authorize_key(&self) -> String {
        format!("{}:authorize", self.id)
    }

    pub fn revoke_key(&self) -> String {
        format!("{}:revoke", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::ResolvedPatterns;

    fn execution() -> Execution {
        let policy = EffectivePolicy {
            role_id: RoleId::new("reader"),
            subject: "user:alice".to_string(),
            permissions: ResolvedPatterns::default(),
            resources: ResolvedPatterns::default(),
            workflows: vec![],
            providers: vec!["aws".to_string()],
            max_duration_secs: None,
            graph_version: 1,
        };
        let request = AccessRequest::new(Identity::user("alice"), "reader", Duration::from_secs(60));
        Execution::new(request, policy, "aws")
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut exec = execution();
        for next in [
            ExecutionState::PendingApproval,
            ExecutionState::Approved,
            ExecutionState::Granting,
            ExecutionState::Active,
            ExecutionState::Expiring,
            ExecutionState::Revoked,
        ] {
            exec.transition(next).unwrap();
        }
        assert_eq!(exec.history.len(), 6);
        assert!(exec.state.is_terminal());
    }

    #[test]
    fn test_active_grant_cannot_fail() {
        let mut exec = execution();
        exec.transition(ExecutionState::PendingApproval).unwrap();
        exec.transition(ExecutionState::Approved).unwrap();
        exec.transition(ExecutionState::Granting).unwrap();
        exec.transition(ExecutionState::Active).unwrap();

        assert!(exec.fail("boom").is_err());
        assert_eq!(exec.state, ExecutionState::Active);
    }

    #[test]
    fn test_decision_only_while_pending() {
        let mut exec = execution();
        assert!(exec.decide(Decision::Approve, "bob", None).is_err());

        exec.transition(ExecutionState::PendingApproval).unwrap();
        exec.decide(Decision::Cancel, "alice", None).unwrap();
        assert_eq!(exec.state, ExecutionState::Failed);
        assert_eq!(exec.failure.as_deref(), Some("cancelled by alice"));

        let err = exec.decide(Decision::Approve, "bob", None).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [ExecutionState::PendingApproval, ExecutionState::Expiring, ExecutionState::Failed] {
            assert_eq!(state.as_str().parse::<ExecutionState>().unwrap(), state);
        }
    }
}
