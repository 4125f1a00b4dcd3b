//! 有效策略: 一次解析的不可变结果

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::role::{ResolvedPatterns, RoleId, WorkflowDefinition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub role_id: RoleId,
    pub subject: String,
    pub permissions: ResolvedPatterns,
    pub resources: ResolvedPatterns,
    /// 祖先在前，去重
    pub workflows: Vec<WorkflowDefinition>,
    /// 祖先在前，去重
    pub providers: Vec<String>,
    pub max_duration_secs: Option<u64>,
    /// 解析时使用的角色图版本
    pub graph_version: u64,
}

impl EffectivePolicy {
    pub fn permits_permission(&self, permission: &str) -> bool {
        self.permissions.permits(permission)
    }

    pub fn permits_resource(&self, resource: &str) -> bool {
        self.resources.permits(resource)
    }

    pub fn permits_provider(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.providers.first().map(String::as_str)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }

    pub fn requires_approval(&self) -> bool {
        !self.workflows.is_empty()
    }
}
