//! Provider 工厂表
//!
//! 配置中的 `uses` 标签映射到构造函数，构造后用 `with` 参数初始化再注册

use std::collections::BTreeMap;
use std::sync::Arc;

use jit_config::ProviderConfig;
use jit_errors::{AppError, AppResult};
use tracing::info;

use super::registry::{Provider, ProviderRegistry};
use super::settings::ProviderSettings;

pub type ProviderConstructor = Box<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

#[derive(Default)]
pub struct ProviderFactory {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个类型标签
    pub fn with_kind<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// 构造并初始化单个 provider
    pub async fn build(&self, id: &str, config: &ProviderConfig) -> AppResult<Arc<dyn Provider>> {
        let constructor = self.constructors.get(&config.uses).ok_or_else(|| {
            AppError::configuration(format!(
                "provider {} uses unknown kind {}",
                id, config.uses
            ))
        })?;

        let mut provider = constructor();
        let settings = ProviderSettings::new(id, config.with.clone());
        provider.initialize(&settings).await?;
        Ok(Arc::from(provider))
    }

    /// 构造配置中的全部 provider 并注册
    pub async fn build_all(
        &self,
        configs: &BTreeMap<String, ProviderConfig>,
        registry: &ProviderRegistry,
    ) -> AppResult<usize> {
        for (id, config) in configs {
            let provider = self.build(id, config).await?;
            registry.register(id.clone(), provider)?;
        }
        info!(count = configs.len(), "Providers initialized");
        Ok(configs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use secrecy::Secret;

    struct NeedsToken;

    #[async_trait]
    impl Provider for NeedsToken {
        fn kind(&self) -> &str {
            "needs-token"
        }

        async fn initialize(&mut self, settings: &ProviderSettings) -> AppResult<()> {
            settings.required("token")?;
            Ok(())
        }
    }

    fn factory() -> ProviderFactory {
        ProviderFactory::new().with_kind("needs-token", || Box::new(NeedsToken))
    }

    #[tokio::test]
    async fn test_unknown_kind_is_configuration_error() {
        let config = ProviderConfig {
            uses: "nope".to_string(),
            with: BTreeMap::new(),
        };
        let err = factory().build("x", &config).await.err().unwrap();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_missing_required_setting_fails_initialization() {
        let registry = ProviderRegistry::new();
        let mut configs = BTreeMap::new();
        configs.insert(
            "svc".to_string(),
            ProviderConfig {
                uses: "needs-token".to_string(),
                with: BTreeMap::new(),
            },
        );
        assert!(factory().build_all(&configs, &registry).await.is_err());
        assert!(registry.entry("svc").is_none());

        let mut with = BTreeMap::new();
        with.insert("token".to_string(), Secret::new("t0k3n".to_string()));
        configs.insert(
            "svc".to_string(),
            ProviderConfig {
                uses: "needs-token".to_string(),
                with,
            },
        );
        assert_eq!(factory().build_all(&configs, &registry).await.unwrap(), 1);
        assert_eq!(registry.entry("svc").unwrap().kind, "needs-token");
    }
}
