//! 审批流程定义

use std::fmt;

use jit_config::{WorkflowConfig, WorkflowStepConfig};
use serde::{Deserialize, Serialize};

/// 流程 ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WorkflowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 流程步骤: 通过指定 notifier 向审批人发送审批请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub notifier: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub approvers: Vec<String>,
}

impl WorkflowStep {
    pub fn new(notifier: impl Into<String>) -> Self {
        Self {
            notifier: notifier.into(),
            channel: None,
            approvers: Vec::new(),
        }
    }
}

/// 审批流程
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<WorkflowId>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }
}

impl From<WorkflowStepConfig> for WorkflowStep {
    fn from(config: WorkflowStepConfig) -> Self {
        Self {
            notifier: config.notifier,
            channel: config.channel,
            approvers: config.approvers,
        }
    }
}

impl From<WorkflowConfig> for WorkflowDefinition {
    fn from(config: WorkflowConfig) -> Self {
        Self {
            id: WorkflowId::from(config.id),
            steps: config.steps.into_iter().map(Into::into).collect(),
        }
    }
}
