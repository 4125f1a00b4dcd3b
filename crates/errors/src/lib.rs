//! jit-errors - 统一错误处理
//!
//! 错误分类与 RFC 7807 Problem Details 映射

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 角色解析错误
///
/// 在任何 provider 被调用之前同步返回给请求方
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("cyclic inheritance: {}", path.join(" -> "))]
    CyclicInheritance { role: String, path: Vec<String> },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("scope mismatch: {subject} is not in scope for role {role}")]
    ScopeMismatch { role: String, subject: String },
}

/// 能力缺失错误 (配置期错误，永不重试)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider {provider} does not implement {capability}")]
pub struct CapabilityError {
    pub provider: String,
    pub capability: String,
}

/// Provider 调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderCallError {
    /// 网络/超时等瞬时错误，可重试
    #[error("transient: {0}")]
    Transient(String),

    /// 后端明确拒绝，不可重试
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ProviderCallError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// 目录同步错误
///
/// 任何同步错误都会中止会话，已安装的目录保持上一个提交版本
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynchronizationError {
    #[error("out-of-order chunk: expected sequence {expected}, received {received}")]
    OutOfOrderChunk { expected: u64, received: u64 },

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("session already open for {provider}/{dataset}")]
    SessionAlreadyOpen { provider: String, dataset: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session is not open: {0}")]
    SessionClosed(String),

    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),
}

/// 应用错误类型
#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("ConfigurationError: {0}")]
    Configuration(String),

    #[error("ResolutionError: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("CapabilityError: {0}")]
    Capability(#[from] CapabilityError),

    #[error("ProviderCallError: {0}")]
    ProviderCall(#[from] ProviderCallError),

    #[error("SynchronizationError: {0}")]
    Synchronization(#[from] SynchronizationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderCall(e) => e.is_transient(),
            Self::Database(_) => true,
            _ => false,
        }
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 500,
            Self::Resolution(ResolutionError::UnknownRole(_)) => 404,
            Self::Resolution(ResolutionError::ScopeMismatch { .. }) => 403,
            Self::Resolution(ResolutionError::CyclicInheritance { .. }) => 422,
            Self::Capability(_) => 422,
            Self::ProviderCall(ProviderCallError::Transient(_)) => 503,
            Self::ProviderCall(ProviderCallError::Permanent(_)) => 502,
            Self::Synchronization(SynchronizationError::SessionNotFound(_)) => 404,
            Self::Synchronization(SynchronizationError::SessionAlreadyOpen { .. }) => 409,
            Self::Synchronization(_) => 422,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: format!("https://jit-access.dev/problems/{}", self.problem_slug()),
            title: self.problem_title().to_string(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_slug(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Resolution(_) => "resolution",
            Self::Capability(_) => "capability",
            Self::ProviderCall(_) => "provider-call",
            Self::Synchronization(_) => "synchronization",
            Self::NotFound(_) => "not-found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
            Self::Database(_) => "database",
        }
    }

    fn problem_title(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration Error",
            Self::Resolution(_) => "Role Resolution Failed",
            Self::Capability(_) => "Capability Not Implemented",
            Self::ProviderCall(_) => "Provider Call Failed",
            Self::Synchronization(_) => "Catalog Synchronization Failed",
            Self::NotFound(_) => "Resource Not Found",
            Self::Validation(_) => "Validation Error",
            Self::Conflict(_) => "Conflict",
            Self::Internal(_) => "Internal Server Error",
            Self::Database(_) => "Database Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_problem_details())).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_taxonomy_prefix() {
        let err = AppError::from(ResolutionError::CyclicInheritance {
            role: "a".to_string(),
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        });
        assert_eq!(err.to_string(), "ResolutionError: cyclic inheritance: a -> b -> a");

        let err = AppError::from(CapabilityError {
            provider: "slack".to_string(),
            capability: "Authorizer".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "CapabilityError: provider slack does not implement Authorizer"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::from(ProviderCallError::transient("timeout")).is_retryable());
        assert!(!AppError::from(ProviderCallError::permanent("denied")).is_retryable());
        assert!(!AppError::configuration("missing key").is_retryable());
        assert!(AppError::database("connection reset").is_retryable());
    }

    #[test]
    fn test_status_codes() {
        let scope = AppError::from(ResolutionError::ScopeMismatch {
            role: "r".to_string(),
            subject: "u".to_string(),
        });
        assert_eq!(scope.status_code(), 403);
        assert_eq!(
            AppError::from(SynchronizationError::SessionAlreadyOpen {
                provider: "aws".to_string(),
                dataset: "roles".to_string(),
            })
            .status_code(),
            409
        );
        assert_eq!(AppError::not_found("x").status_code(), 404);
    }

    #[test]
    fn test_problem_details() {
        let problem = AppError::validation("duration too long").to_problem_details();
        assert_eq!(problem.status, 400);
        assert_eq!(problem.title, "Validation Error");
        assert!(problem.r#type.ends_with("/validation"));
        assert_eq!(problem.detail, "Validation error: duration too long");
    }
}
