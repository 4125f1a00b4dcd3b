//! 编排器运行参数

use std::time::Duration;

use jit_common::RetryConfig;
use jit_config::OrchestratorConfig;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub authorize_retry: RetryConfig,
    pub notify_retry: RetryConfig,
    /// 撤销只用其退避延迟，尝试次数由 `revoke_max_attempts` 控制
    pub revoke_backoff: RetryConfig,
    pub revoke_max_attempts: Option<u32>,
    pub alert_after_attempts: u32,
    pub approval_timeout: Duration,
    pub default_duration: Duration,
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            authorize_retry: config.authorize_retry.to_retry_config(),
            notify_retry: config.notify_retry.to_retry_config(),
            revoke_backoff: config.revoke_retry.backoff(),
            revoke_max_attempts: config.revoke_retry.max_attempts,
            alert_after_attempts: config.alert_after_attempts,
            approval_timeout: Duration::from_secs(config.approval_timeout_secs),
            default_duration: Duration::from_secs(config.default_duration_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}
