//! jit-config - 配置加载库

use std::collections::BTreeMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use jit_common::RetryConfig;
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// 有界重试配置 (授权、通知)
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_multiplier(self.multiplier)
    }
}

/// 撤销重试配置
///
/// `max_attempts` 为空表示无限重试，仅受退避上限约束
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RevokeRetrySettings {
    /// 仅用于计算退避延迟，尝试次数由 `max_attempts` 单独控制
    pub fn backoff(&self) -> RetryConfig {
        RetryConfig::new(
            u32::MAX,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_multiplier(self.multiplier)
    }
}

/// 编排器配置
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_authorize_retry")]
    pub authorize_retry: RetrySettings,
    #[serde(default = "default_notify_retry")]
    pub notify_retry: RetrySettings,
    #[serde(default = "default_revoke_retry")]
    pub revoke_retry: RevokeRetrySettings,
    /// 撤销连续失败多少次后发出人工介入告警
    #[serde(default = "default_alert_after_attempts")]
    pub alert_after_attempts: u32,
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
}

fn default_authorize_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 5,
        initial_delay_ms: 200,
        max_delay_ms: 10_000,
        multiplier: 2.0,
    }
}

fn default_notify_retry() -> RetrySettings {
    RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 200,
        max_delay_ms: 5_000,
        multiplier: 2.0,
    }
}

fn default_revoke_retry() -> RevokeRetrySettings {
    RevokeRetrySettings {
        initial_delay_ms: 500,
        max_delay_ms: 60_000,
        multiplier: 2.0,
        max_attempts: None,
    }
}

fn default_alert_after_attempts() -> u32 {
    10
}

fn default_approval_timeout_secs() -> u64 {
    86_400
}

fn default_duration_secs() -> u64 {
    3_600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            authorize_retry: default_authorize_retry(),
            notify_retry: default_notify_retry(),
            revoke_retry: default_revoke_retry(),
            alert_after_attempts: default_alert_after_attempts(),
            approval_timeout_secs: default_approval_timeout_secs(),
            default_duration_secs: default_duration_secs(),
        }
    }
}

/// 目录同步配置
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// 拉取目录时每个分块的字节数
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// RBAC 列表查询的分页大小
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_page_size() -> u32 {
    100
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            page_size: default_page_size(),
        }
    }
}

/// Provider 配置
///
/// `uses` 是 provider 工厂表中的类型标签，`with` 是传给 provider 初始化的参数
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub uses: String,
    #[serde(default)]
    pub with: BTreeMap<String, Secret<String>>,
}

/// allow/deny 模式集合
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternRulesConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// 角色适用范围
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopesConfig {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// 管理员定义的角色
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub permissions: PatternRulesConfig,
    #[serde(default)]
    pub resources: PatternRulesConfig,
    #[serde(default)]
    pub scopes: ScopesConfig,
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

/// 审批流程步骤
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStepConfig {
    pub notifier: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub approvers: Vec<String>,
}

/// 审批流程
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStepConfig>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 合并顺序: default.toml -> {APP_ENV}.toml -> JIT_ 前缀环境变量 (`__` 分隔层级)
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("JIT_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
