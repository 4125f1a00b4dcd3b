//! 角色定义

use std::collections::BTreeSet;
use std::fmt;

use jit_config::{PatternRulesConfig, RoleConfig, ScopesConfig};
use serde::{Deserialize, Serialize};

use super::identity::Identity;
use super::pattern::{Pattern, PatternRules};
use super::workflow::WorkflowId;

/// 角色 ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 角色适用范围
///
/// 三个集合都为空表示不限制
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scopes {
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub domains: BTreeSet<String>,
}

impl Scopes {
    pub fn is_unrestricted(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.domains.is_empty()
    }

    /// 主体是否在范围内
    pub fn admits(&self, identity: &Identity) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        match identity {
            Identity::User(user) => {
                self.users.contains(&user.id)
                    || user.groups.iter().any(|g| self.groups.contains(g))
                    || user.domain().is_some_and(|d| self.domains.contains(d))
            }
            Identity::Group(group) => self.groups.contains(&group.id),
        }
    }
}

/// 角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    #[serde(default)]
    pub name: Option<String>,
    /// 父角色，按声明顺序遍历
    #[serde(default)]
    pub inherits: Vec<RoleId>,
    #[serde(default)]
    pub permissions: PatternRules,
    #[serde(default)]
    pub resources: PatternRules,
    #[serde(default)]
    pub scopes: Scopes,
    #[serde(default)]
    pub workflows: Vec<WorkflowId>,
    #[serde(default)]
    pub providers: BTreeSet<String>,
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

impl Role {
    pub fn new(id: impl Into<RoleId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            inherits: Vec::new(),
            permissions: PatternRules::default(),
            resources: PatternRules::default(),
            scopes: Scopes::default(),
            workflows: Vec::new(),
            providers: BTreeSet::new(),
            max_duration_secs: None,
        }
    }

    pub fn inherits(mut self, parent: impl Into<RoleId>) -> Self {
        self.inherits.push(parent.into());
        self
    }

    pub fn allow_permission(mut self, pattern: impl Into<Pattern>) -> Self {
        self.permissions.allow.insert(pattern.into());
        self
    }

    pub fn deny_permission(mut self, pattern: impl Into<Pattern>) -> Self {
        self.permissions.deny.insert(pattern.into());
        self
    }

    pub fn allow_resource(mut self, pattern: impl Into<Pattern>) -> Self {
        self.resources.allow.insert(pattern.into());
        self
    }

    pub fn deny_resource(mut self, pattern: impl Into<Pattern>) -> Self {
        self.resources.deny.insert(pattern.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Scopes) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_workflow(mut self, workflow: impl Into<WorkflowId>) -> Self {
        let workflow = workflow.into();
        if !self.workflows.contains(&workflow) {
            self.workflows.push(workflow);
        }
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.providers.insert(provider.into());
        self
    }

    pub fn with_max_duration_secs(mut self, secs: u64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }
}

fn rules_from_config(config: PatternRulesConfig) -> PatternRules {
    PatternRules::new(config.allow, config.deny)
}

impl From<ScopesConfig> for Scopes {
    fn from(config: ScopesConfig) -> Self {
        Self {
            users: config.users.into_iter().collect(),
            groups: config.groups.into_iter().collect(),
            domains: config.domains.into_iter().collect(),
        }
    }
}

impl From<RoleConfig> for Role {
    fn from(config: RoleConfig) -> Self {
        let mut workflows = Vec::new();
        for workflow in config.workflows.into_iter().map(WorkflowId::from) {
            if !workflows.contains(&workflow) {
                workflows.push(workflow);
            }
        }
        Self {
            id: RoleId::from(config.id),
            name: config.name,
            inherits: config.inherits.into_iter().map(RoleId::from).collect(),
            permissions: rules_from_config(config.permissions),
            resources: rules_from_config(config.resources),
            scopes: config.scopes.into(),
            workflows,
            providers: config.providers.into_iter().collect(),
            max_duration_secs: config.max_duration_secs,
        }
    }
}
