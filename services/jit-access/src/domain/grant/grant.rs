//! 授予记录

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::execution::ExecutionId;
use crate::domain::policy::EffectivePolicy;
use crate::domain::role::{Identity, RoleId};
use crate::provider::GrantHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub Uuid);

impl GrantId {
    pub fn new() -> Self {
        Self(jit_common::new_id())
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GrantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Active,
    Expiring,
    Revoked,
}

/// 已生效的访问授予
///
/// 只在授权调用成功后创建，撤销成功后归档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub execution_id: ExecutionId,
    pub subject: Identity,
    pub role_id: RoleId,
    pub provider_id: String,
    pub policy: EffectivePolicy,
    pub handle: GrantHandle,
    pub state: GrantState,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub authorize_attempts: u32,
    #[serde(default)]
    pub revoke_attempts: u32,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Grant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
