//! Provider 初始化参数

use std::collections::BTreeMap;

use jit_errors::{AppError, AppResult};
use secrecy::{ExposeSecret, Secret};

/// provider 的 `with` 参数，值一律按机密处理
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    provider: String,
    values: BTreeMap<String, Secret<String>>,
}

impl ProviderSettings {
    pub fn new(provider: impl Into<String>, values: BTreeMap<String, Secret<String>>) -> Self {
        Self {
            provider: provider.into(),
            values,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// 必填参数，缺失时初始化失败
    pub fn required(&self, key: &str) -> AppResult<&str> {
        self.optional(key).ok_or_else(|| {
            AppError::configuration(format!(
                "provider {} is missing required setting {}",
                self.provider, key
            ))
        })
    }

    pub fn optional(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.expose_secret().as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_setting_fails_closed() {
        let mut values = BTreeMap::new();
        values.insert("channel".to_string(), Secret::new("#access".to_string()));
        let settings = ProviderSettings::new("slack", values);

        assert_eq!(settings.required("channel").unwrap(), "#access");
        let err = settings.required("token").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(!format!("{:?}", settings).contains("#access"));
    }
}
