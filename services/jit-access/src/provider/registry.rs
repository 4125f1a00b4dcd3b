//! Provider 注册表
//!
//! 注册时一次性解析 provider 支持的能力，之后按能力做类型化分发

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use jit_errors::{AppError, AppResult, CapabilityError};
use tracing::info;

use super::capability::{Authorizer, Capability, IdentityDirectory, Notifier, RoleBasedAccessControl};
use super::settings::ProviderSettings;

/// Provider 插件
///
/// 能力访问器默认返回 `None`，实现方对支持的能力返回 `Some(self)`
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// 工厂表中的类型标签
    fn kind(&self) -> &str;

    /// 使用 `with` 参数初始化，缺少必填参数时失败
    async fn initialize(&mut self, _settings: &ProviderSettings) -> AppResult<()> {
        Ok(())
    }

    fn authorizer(self: Arc<Self>) -> Option<Arc<dyn Authorizer>> {
        None
    }

    fn notifier(self: Arc<Self>) -> Option<Arc<dyn Notifier>> {
        None
    }

    fn rbac(self: Arc<Self>) -> Option<Arc<dyn RoleBasedAccessControl>> {
        None
    }

    fn identity(self: Arc<Self>) -> Option<Arc<dyn IdentityDirectory>> {
        None
    }
}

/// 已注册的 provider 及其能力
pub struct ProviderEntry {
    pub id: String,
    pub kind: String,
    capabilities: BTreeSet<Capability>,
    authorizer: Option<Arc<dyn Authorizer>>,
    notifier: Option<Arc<dyn Notifier>>,
    rbac: Option<Arc<dyn RoleBasedAccessControl>>,
    identity: Option<Arc<dyn IdentityDirectory>>,
}

impl ProviderEntry {
    fn new(id: String, provider: Arc<dyn Provider>) -> Self {
        let kind = provider.kind().to_string();
        let authorizer = provider.clone().authorizer();
        let notifier = provider.clone().notifier();
        let rbac = provider.clone().rbac();
        let identity = provider.identity();

        let mut capabilities = BTreeSet::new();
        if authorizer.is_some() {
            capabilities.insert(Capability::Authorizer);
        }
        if notifier.is_some() {
            capabilities.insert(Capability::Notifier);
        }
        if rbac.is_some() {
            capabilities.insert(Capability::RoleBasedAccessControl);
        }
        if identity.is_some() {
            capabilities.insert(Capability::Identity);
        }

        Self {
            id,
            kind,
            capabilities,
            authorizer,
            notifier,
            rbac,
            identity,
        }
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// 可分发的能力接口
pub trait CapabilityPort: Send + Sync {
    const CAPABILITY: Capability;

    fn select(entry: &ProviderEntry) -> Option<Arc<Self>>;
}

impl CapabilityPort for dyn Authorizer {
    const CAPABILITY: Capability = Capability::Authorizer;

    fn select(entry: &ProviderEntry) -> Option<Arc<Self>> {
        entry.authorizer.clone()
    }
}

impl CapabilityPort for dyn Notifier {
    const CAPABILITY: Capability = Capability::Notifier;

    fn select(entry: &ProviderEntry) -> Option<Arc<Self>> {
        entry.notifier.clone()
    }
}

impl CapabilityPort for dyn RoleBasedAccessControl {
    const CAPABILITY: Capability = Capability::RoleBasedAccessControl;

    fn select(entry: &ProviderEntry) -> Option<Arc<Self>> {
        entry.rbac.clone()
    }
}

impl CapabilityPort for dyn IdentityDirectory {
    const CAPABILITY: Capability = Capability::Identity;

    fn select(entry: &ProviderEntry) -> Option<Arc<Self>> {
        entry.identity.clone()
    }
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: RwLock<BTreeMap<String, Arc<ProviderEntry>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册已初始化的 provider，ID 重复时失败
    pub fn register(&self, id: impl Into<String>, provider: Arc<dyn Provider>) -> AppResult<()> {
        let id = id.into();
        let entry = ProviderEntry::new(id.clone(), provider);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return Err(AppError::configuration(format!("provider {} is already registered", id)));
        }
        info!(
            provider = %id,
            kind = %entry.kind,
            capabilities = ?entry.capabilities,
            "Provider registered"
        );
        entries.insert(id, Arc::new(entry));
        Ok(())
    }

    pub fn entry(&self, id: &str) -> Option<Arc<ProviderEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// 查找 provider 并断言其实现了能力 `C`
    ///
    /// 未注册的 provider 是配置错误；已注册但缺少能力返回 `CapabilityError`
    pub fn dispatch<C>(&self, id: &str) -> AppResult<Arc<C>>
    where
        C: CapabilityPort + ?Sized,
    {
        let entry = self
            .entry(id)
            .ok_or_else(|| AppError::configuration(format!("provider {} is not registered", id)))?;
        C::select(&entry).ok_or_else(|| {
            CapabilityError {
                provider: id.to_string(),
                capability: C::CAPABILITY.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::EffectivePolicy;
    use crate::domain::role::Identity;
    use crate::provider::capability::{CallContext, GrantHandle};
    use jit_errors::ProviderCallError;

    struct NotifyOnly;

    #[async_trait]
    impl Provider for NotifyOnly {
        fn kind(&self) -> &str {
            "notify-only"
        }

        fn notifier(self: Arc<Self>) -> Option<Arc<dyn Notifier>> {
            Some(self)
        }
    }

    #[async_trait]
    impl Notifier for NotifyOnly {
        async fn send_notification(
            &self,
            _ctx: &CallContext,
            _notification: &crate::provider::ApprovalNotification,
        ) -> Result<(), ProviderCallError> {
            Ok(())
        }
    }

    struct Grants;

    #[async_trait]
    impl Provider for Grants {
        fn kind(&self) -> &str {
            "grants"
        }

        fn authorizer(self: Arc<Self>) -> Option<Arc<dyn Authorizer>> {
            Some(self)
        }
    }

    #[async_trait]
    impl Authorizer for Grants {
        async fn authorize_role(
            &self,
            ctx: &CallContext,
            _subject: &Identity,
            _policy: &EffectivePolicy,
        ) -> Result<GrantHandle, ProviderCallError> {
            Ok(GrantHandle::new(ctx.idempotency_key.clone()))
        }

        async fn revoke_role(
            &self,
            _ctx: &CallContext,
            _subject: &Identity,
            _policy: &EffectivePolicy,
            _handle: &GrantHandle,
        ) -> Result<(), ProviderCallError> {
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_checks_capability() {
        let registry = ProviderRegistry::new();
        registry.register("slack", Arc::new(NotifyOnly)).unwrap();
        registry.register("aws", Arc::new(Grants)).unwrap();

        assert!(registry.dispatch::<dyn Notifier>("slack").is_ok());
        assert!(registry.dispatch::<dyn Authorizer>("aws").is_ok());

        let err = registry.dispatch::<dyn Authorizer>("slack").err().unwrap();
        match err {
            AppError::Capability(e) => {
                assert_eq!(e.provider, "slack");
                assert_eq!(e.capability, "Authorizer");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err_string(registry.dispatch::<dyn Authorizer>("slack").err().unwrap()),
            "CapabilityError: provider slack does not implement Authorizer"
        );
    }

    #[test]
    fn test_unknown_and_duplicate_providers() {
        let registry = ProviderRegistry::new();
        registry.register("aws", Arc::new(Grants)).unwrap();

        assert!(matches!(
            registry.register("aws", Arc::new(Grants)),
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            registry.dispatch::<dyn Authorizer>("gcp").err().unwrap(),
            AppError::Configuration(_)
        ));

        let entry = registry.entry("aws").unwrap();
        assert!(entry.supports(Capability::Authorizer));
        assert!(!entry.supports(Capability::Notifier));
    }

    fn err_string(err: AppError) -> String {
        err.to_string()
    }
}
