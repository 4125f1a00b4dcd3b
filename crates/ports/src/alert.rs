//! 运维告警 trait 定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jit_errors::AppResult;
use serde::{Deserialize, Serialize};

/// 需要人工介入的告警
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    /// 去重键 (同一对象的同类告警共用)
    pub key: String,
    pub summary: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl OperatorAlert {
    pub fn new(key: impl Into<String>, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            detail: detail.into(),
            raised_at: Utc::now(),
        }
    }
}

/// 告警发送 trait
#[async_trait]
pub trait AlertPort: Send + Sync {
    /// 发出告警
    async fn raise(&self, alert: &OperatorAlert) -> AppResult<()>;
}
